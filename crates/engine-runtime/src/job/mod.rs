//! Entry point the scheduler calls for each sharding item of a job.

use crate::{
    api::JobApi,
    barrier::{DistributedBarrier, barrier_enable_path},
    context::{JobItemContext, TransmissionProcessContext},
    error::{JobError, TaskError},
    execute::ExecuteEngine,
    prepare::JobPreparer,
    runner::{JobRegistry, JobRunnerManager, TasksRunner},
    task::partition_by_progress,
};
use engine_core::{
    governance::GovernanceFacade,
    sink::{NoopSink, PipelineSink, encode_response},
    state::ProgressStore,
};
use model::{
    job::{JobStatus, JobType, id},
    response::CdcResponse,
    sharding::ShardingContext,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

mod callback;

use callback::{IncrementalCallback, InventoryCallback};

pub const PIPELINE_ERROR_CODE: &str = "PIPELINE_ERROR";

/// Collaborators shared by every job of the process.
pub struct JobServices {
    pub governance: GovernanceFacade,
    pub job_api: Arc<dyn JobApi>,
    pub registry: Arc<JobRegistry>,
    pub barrier: Arc<DistributedBarrier>,
    pub preparer: Arc<dyn JobPreparer>,
    pub progress: Arc<dyn ProgressStore>,
    pub sink: Arc<dyn PipelineSink>,
    pub engine: ExecuteEngine,
}

impl JobServices {
    pub fn new(
        governance: GovernanceFacade,
        job_api: Arc<dyn JobApi>,
        registry: Arc<JobRegistry>,
        barrier: Arc<DistributedBarrier>,
        preparer: Arc<dyn JobPreparer>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            governance,
            job_api,
            registry,
            barrier,
            preparer,
            progress,
            sink: Arc::new(NoopSink),
            engine: ExecuteEngine::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PipelineSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// A job as seen by one node: the runners of the items it drives here.
pub struct PipelineJob {
    inner: Arc<JobInner>,
}

pub(crate) struct JobInner {
    services: Arc<JobServices>,
    manager: Arc<JobRunnerManager>,
    triggered: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineJob {
    pub fn new(services: Arc<JobServices>) -> Self {
        Self {
            inner: Arc::new(JobInner {
                services,
                manager: Arc::new(JobRunnerManager::new()),
                triggered: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn runner_manager(&self) -> &Arc<JobRunnerManager> {
        &self.inner.manager
    }

    /// Runs the sharding item assigned by `sharding`.
    ///
    /// Returns once the inventory tasks are triggered; phase transitions
    /// and failure handling continue in the background. An item that is
    /// already running here, or a job that is stopping, is skipped.
    pub async fn execute(&self, sharding: &ShardingContext) -> Result<(), JobError> {
        let span = info_span!(
            "pipeline_job",
            job_id = %sharding.job_id,
            sharding_item = sharding.sharding_item
        );
        self.inner.clone().execute(sharding).instrument(span).await
    }

    /// Waits for every triggered task group and its callback, including
    /// groups triggered later by those callbacks.
    pub async fn join_triggered(&self) {
        loop {
            let handles = std::mem::take(
                &mut *self
                    .inner
                    .triggered
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Task group callback did not complete");
                }
            }
        }
    }
}

impl JobInner {
    async fn execute(self: Arc<Self>, sharding: &ShardingContext) -> Result<(), JobError> {
        let job_id = sharding.job_id.as_str();
        let job_type = id::parse_job_type(job_id)?;
        let context_key = id::parse_context_key(job_id)?;

        if self.manager.is_stopping() {
            info!("Job is stopping, skip execution");
            return Ok(());
        }

        let services = &self.services;
        let job_config = Arc::new(services.governance.job_configs().load(job_id).await?);
        if sharding.sharding_item >= job_config.sharding_count {
            return Err(JobError::InvalidShardingItem {
                job_id: job_id.to_string(),
                sharding_item: sharding.sharding_item,
                sharding_count: job_config.sharding_count,
            });
        }

        let process_config = services.governance.process_configs().load(job_type).await?;
        let process = Arc::new(TransmissionProcessContext::new(process_config)?);

        let items: Vec<u32> = if job_type.handles_all_items() {
            (0..job_config.sharding_count).collect()
        } else {
            vec![sharding.sharding_item]
        };

        let mut contexts = Vec::with_capacity(items.len());
        for item in items {
            let init_progress = services.progress.load_progress(job_id, item).await?;
            let context = Arc::new(
                JobItemContext::builder(job_config.clone(), item, process.clone())
                    .init_progress(init_progress)
                    .sink(services.sink.clone())
                    .build(),
            );
            let runner = Arc::new(TasksRunner::new(context.clone()));
            if !self.manager.add_tasks_runner(item, runner) {
                info!(sharding_item = item, "Job item already running or stopping, skip");
                continue;
            }
            contexts.push(context);
        }
        if contexts.is_empty() {
            return Ok(());
        }
        if services.registry.add(job_id, self.manager.clone()) {
            debug!("Registered job runner manager");
        }

        info!(
            job_type = %job_type,
            database = %context_key.database_name,
            items = contexts.len(),
            "Execute job"
        );

        if let Err(e) = self.announce(job_id, &contexts).await {
            for context in &contexts {
                self.manager.remove_tasks_runner(context.sharding_item());
            }
            return Err(e);
        }

        if let Err(e) = services.preparer.init_tasks(&contexts).await {
            error!(error = %e, "Failed to prepare job");
            for context in &contexts {
                context.set_status(JobStatus::PrepareFailure);
                self.record_error(context, &e.to_string()).await;
            }
            self.escalate(job_id).await;
            return Err(JobError::Prepare {
                job_id: job_id.to_string(),
                source: e,
            });
        }

        for context in contexts {
            self.start_inventory(context, job_type);
        }
        Ok(())
    }

    /// Clears stale errors and acknowledges each item on the enable barrier.
    async fn announce(&self, job_id: &str, contexts: &[Arc<JobItemContext>]) -> Result<(), JobError> {
        let enable_path = barrier_enable_path(job_id);
        for context in contexts {
            let item = context.sharding_item();
            self.services.governance.errors().clean(job_id, item).await?;
            self.services
                .barrier
                .persist_ephemeral_children_node(&enable_path, item)
                .await?;
        }
        Ok(())
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        triggered.retain(|h| !h.is_finished());
        triggered.push(handle);
    }

    pub(crate) fn start_inventory(self: &Arc<Self>, context: Arc<JobItemContext>, job_type: JobType) {
        let (finished, active) = partition_by_progress(&context.inventory_tasks());
        debug!(
            sharding_item = context.sharding_item(),
            finished = finished.len(),
            active = active.len(),
            "Start inventory tasks"
        );

        let callback = Arc::new(InventoryCallback::new(self.clone(), context, job_type));
        let handle = self.services.engine.trigger(&active, callback);
        self.track(handle);
    }

    pub(crate) fn start_incremental(self: &Arc<Self>, context: Arc<JobItemContext>) {
        let (finished, active) = partition_by_progress(&context.incremental_tasks());
        debug!(
            sharding_item = context.sharding_item(),
            finished = finished.len(),
            active = active.len(),
            "Start incremental tasks"
        );

        let callback = Arc::new(IncrementalCallback::new(self.clone(), context));
        let handle = self.services.engine.trigger(&active, callback);
        self.track(handle);
    }

    pub(crate) async fn persist_progress(&self, context: &JobItemContext) {
        let progress = context.to_progress();
        if let Err(e) = self.services.progress.save_progress(&progress).await {
            warn!(
                sharding_item = context.sharding_item(),
                error = %e,
                "Failed to persist job item progress"
            );
        }
    }

    /// Item is done for good; a later execution may run it again.
    pub(crate) fn release(&self, context: &JobItemContext) {
        self.manager.remove_tasks_runner(context.sharding_item());
    }

    async fn record_error(&self, context: &JobItemContext, message: &str) {
        let errors = self.services.governance.errors();
        if let Err(e) = errors
            .update(context.job_id(), context.sharding_item(), message)
            .await
        {
            warn!(
                sharding_item = context.sharding_item(),
                error = %e,
                "Failed to record job item error"
            );
        }
    }

    /// Disables the job cluster-wide and stops it on this node.
    async fn escalate(&self, job_id: &str) {
        if let Err(e) = self.services.job_api.disable(job_id).await {
            warn!(job_id, error = %e, "Failed to disable job");
        }
        self.services.registry.stop(job_id);
    }

    pub(crate) async fn on_task_failure(&self, context: &JobItemContext, error: TaskError) {
        let job_id = context.job_id();
        error!(
            job_id,
            sharding_item = context.sharding_item(),
            error = %error,
            "Task execution failed"
        );

        let message = error.to_string();
        context.set_status(JobStatus::ExecuteFailure);
        self.persist_progress(context).await;
        self.record_error(context, &message).await;
        self.escalate(job_id).await;

        let Some(channel) = context.sink().channel() else {
            return;
        };
        let frame = match encode_response(&CdcResponse::failed(PIPELINE_ERROR_CODE, message)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to encode failure response");
                return;
            }
        };
        if let Err(e) = channel.write_and_flush(frame) {
            warn!(job_id, error = %e, "Failed to notify client of job failure");
        }
    }
}
