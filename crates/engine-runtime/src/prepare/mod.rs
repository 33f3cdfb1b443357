use crate::{context::JobItemContext, error::PrepareError, task::PipelineTask};
use async_trait::async_trait;
use std::sync::Arc;

pub mod datasource;
pub mod dialect;
pub mod transmission;

pub use datasource::{DataSourcePreparer, DdlGenerator, SqlError, SqlExecutor};
pub use transmission::{TransmissionConnector, TransmissionJobPreparer, TransmissionTaskFactory};

/// Fills freshly registered item contexts with their tasks.
#[async_trait]
pub trait JobPreparer: Send + Sync {
    async fn init_tasks(&self, contexts: &[Arc<JobItemContext>]) -> Result<(), PrepareError>;
}

/// Builds the tasks of one item, resuming from `context.init_progress()`.
#[async_trait]
pub trait TaskFactory: Send + Sync {
    async fn create_tasks(
        &self,
        context: &JobItemContext,
    ) -> Result<Vec<Arc<dyn PipelineTask>>, PrepareError>;
}
