use crate::error::TaskError;
use futures::future::BoxFuture;
use model::position::{TaskKind, TaskProgress};
use std::sync::Arc;

pub mod transmission;

pub use transmission::{Dumper, Importer, TransmissionTask};

/// One independently running unit of a started task.
pub type TaskFuture = BoxFuture<'static, Result<(), TaskError>>;

pub trait PipelineTask: Send + Sync {
    fn task_id(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn progress(&self) -> TaskProgress;

    /// Starts the task and returns one future per internal worker.
    ///
    /// The futures are not polled here; the caller decides where they run.
    fn start(&self) -> Vec<TaskFuture>;

    /// Asks the task's workers to wind down. Futures already handed out
    /// keep running until they observe the request.
    fn stop(&self);
}

/// Splits `tasks` into `(finished, active)`, keeping their order.
pub fn partition_by_progress(
    tasks: &[Arc<dyn PipelineTask>],
) -> (Vec<Arc<dyn PipelineTask>>, Vec<Arc<dyn PipelineTask>>) {
    tasks
        .iter()
        .cloned()
        .partition(|task| task.progress().is_finished())
}
