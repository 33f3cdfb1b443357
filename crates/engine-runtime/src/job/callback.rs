use crate::{context::JobItemContext, error::TaskError, execute::ExecuteCallback, job::JobInner};
use async_trait::async_trait;
use model::job::{JobStatus, JobType};
use std::sync::Arc;
use tracing::info;

/// Promotes an item to its next phase once its inventory tasks succeed.
pub(crate) struct InventoryCallback {
    job: Arc<JobInner>,
    context: Arc<JobItemContext>,
    job_type: JobType,
}

impl InventoryCallback {
    pub(crate) fn new(job: Arc<JobInner>, context: Arc<JobItemContext>, job_type: JobType) -> Self {
        Self {
            job,
            context,
            job_type,
        }
    }
}

#[async_trait]
impl ExecuteCallback for InventoryCallback {
    async fn on_success(&self) {
        let context = &self.context;
        if context.is_stopping() {
            info!(
                job_id = context.job_id(),
                sharding_item = context.sharding_item(),
                "Inventory finished while stopping, skip incremental tasks"
            );
            return;
        }

        if self.job_type.has_incremental_phase() {
            context.set_status(JobStatus::ExecuteIncrementalTask);
            self.job.persist_progress(context).await;
            self.job.start_incremental(context.clone());
        } else {
            context.set_status(JobStatus::Finished);
            self.job.persist_progress(context).await;
            self.job.release(context);
            info!(
                job_id = context.job_id(),
                sharding_item = context.sharding_item(),
                "Job item finished"
            );
        }
    }

    async fn on_failure(&self, error: TaskError) {
        self.job.on_task_failure(&self.context, error).await;
    }
}

/// Incremental tasks only end on stop or failure.
pub(crate) struct IncrementalCallback {
    job: Arc<JobInner>,
    context: Arc<JobItemContext>,
}

impl IncrementalCallback {
    pub(crate) fn new(job: Arc<JobInner>, context: Arc<JobItemContext>) -> Self {
        Self { job, context }
    }
}

#[async_trait]
impl ExecuteCallback for IncrementalCallback {
    async fn on_success(&self) {
        self.job.persist_progress(&self.context).await;
        info!(
            job_id = self.context.job_id(),
            sharding_item = self.context.sharding_item(),
            "Incremental tasks completed"
        );
    }

    async fn on_failure(&self, error: TaskError) {
        self.job.on_task_failure(&self.context, error).await;
    }
}
