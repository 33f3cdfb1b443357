use crate::{context::TransmissionProcessContext, task::PipelineTask};
use chrono::Utc;
use engine_core::sink::{NoopSink, PipelineSink};
use model::{
    job::{JobConfiguration, JobItemProgress, JobStatus},
    position::TaskKind,
};
use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

/// Mutable state of one sharding item while its runner is registered.
pub struct JobItemContext {
    job_config: Arc<JobConfiguration>,
    sharding_item: u32,
    init_progress: Option<JobItemProgress>,
    process: Arc<TransmissionProcessContext>,
    sink: Arc<dyn PipelineSink>,
    status: RwLock<JobStatus>,
    inventory_tasks: RwLock<Vec<Arc<dyn PipelineTask>>>,
    incremental_tasks: RwLock<Vec<Arc<dyn PipelineTask>>>,
    stopping: AtomicBool,
}

impl JobItemContext {
    pub fn builder(
        job_config: Arc<JobConfiguration>,
        sharding_item: u32,
        process: Arc<TransmissionProcessContext>,
    ) -> JobItemContextBuilder {
        JobItemContextBuilder::new(job_config, sharding_item, process)
    }

    pub fn job_id(&self) -> &str {
        &self.job_config.job_id
    }

    pub fn sharding_item(&self) -> u32 {
        self.sharding_item
    }

    pub fn job_config(&self) -> &Arc<JobConfiguration> {
        &self.job_config
    }

    /// Progress persisted by an earlier run of this item, if any.
    pub fn init_progress(&self) -> Option<&JobItemProgress> {
        self.init_progress.as_ref()
    }

    pub fn process(&self) -> &Arc<TransmissionProcessContext> {
        &self.process
    }

    pub fn sink(&self) -> &Arc<dyn PipelineSink> {
        &self.sink
    }

    pub fn status(&self) -> JobStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: JobStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn set_stopping(&self, stopping: bool) {
        self.stopping.store(stopping, Ordering::SeqCst);
    }

    pub fn inventory_tasks(&self) -> Vec<Arc<dyn PipelineTask>> {
        self.inventory_tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn incremental_tasks(&self) -> Vec<Arc<dyn PipelineTask>> {
        self.incremental_tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_task(&self, task: Arc<dyn PipelineTask>) {
        let tasks = match task.kind() {
            TaskKind::Inventory => &self.inventory_tasks,
            TaskKind::Incremental => &self.incremental_tasks,
        };
        tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Every task of the item, inventory first.
    pub fn all_tasks(&self) -> Vec<Arc<dyn PipelineTask>> {
        let mut tasks = self.inventory_tasks();
        tasks.extend(self.incremental_tasks());
        tasks
    }

    /// Snapshot of the item for the progress store.
    pub fn to_progress(&self) -> JobItemProgress {
        let mut progress = JobItemProgress::new(self.job_id(), self.sharding_item, self.status());
        for task in self.inventory_tasks() {
            let state = task.progress();
            progress.processed_records += state.processed_records;
            progress
                .inventory
                .insert(task.task_id().to_string(), state.position);
        }
        for task in self.incremental_tasks() {
            let state = task.progress();
            progress.processed_records += state.processed_records;
            progress
                .incremental
                .insert(task.task_id().to_string(), state.position);
        }
        progress.updated_at = Utc::now();
        progress
    }
}

pub struct JobItemContextBuilder {
    job_config: Arc<JobConfiguration>,
    sharding_item: u32,
    process: Arc<TransmissionProcessContext>,
    init_progress: Option<JobItemProgress>,
    sink: Option<Arc<dyn PipelineSink>>,
}

impl JobItemContextBuilder {
    fn new(
        job_config: Arc<JobConfiguration>,
        sharding_item: u32,
        process: Arc<TransmissionProcessContext>,
    ) -> Self {
        Self {
            job_config,
            sharding_item,
            process,
            init_progress: None,
            sink: None,
        }
    }

    pub fn init_progress(mut self, progress: Option<JobItemProgress>) -> Self {
        self.init_progress = progress;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn PipelineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> JobItemContext {
        JobItemContext {
            job_config: self.job_config,
            sharding_item: self.sharding_item,
            init_progress: self.init_progress,
            process: self.process,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink)),
            status: RwLock::new(JobStatus::Preparing),
            inventory_tasks: RwLock::new(Vec::new()),
            incremental_tasks: RwLock::new(Vec::new()),
            stopping: AtomicBool::new(false),
        }
    }
}
