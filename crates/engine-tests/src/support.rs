//! Test doubles and a wired-up job for the scenario tests.

use async_trait::async_trait;
use engine_core::{
    coordination::MemoryCoordinationStore,
    error::GovernanceError,
    governance::{GovernanceFacade, JobItemErrorService},
    sink::{NoopSink, PipelineSink},
    state::SledProgressStore,
};
use engine_runtime::{
    api::JobApi,
    barrier::DistributedBarrier,
    context::JobItemContext,
    error::{BoxError, PrepareError, TaskError},
    job::{JobServices, PipelineJob},
    prepare::{DdlGenerator, JobPreparer, SqlError, SqlExecutor, TransmissionConnector},
    runner::JobRegistry,
    task::{Dumper, Importer, PipelineTask, TaskFuture},
};
use futures::FutureExt;
use model::{
    job::{
        ContextKey, DataNodeLine, DataSourceConfiguration, DatabaseType, InstanceType,
        JobConfiguration, JobStatus, JobType, QualifiedTable, TableMapping, id,
    },
    position::{IngestPosition, TaskKind, TaskProgress},
    record::{DataRecord, DataRecordType},
    sharding::ShardingContext,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Ordered record of what the mock tasks did, shared across tasks.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Resolves right away.
    Complete,
    /// Resolves with an execution error carrying this message.
    Fail(&'static str),
    /// Runs until the task is stopped, like a change stream.
    Stream,
}

pub struct MockTask {
    task_id: String,
    kind: TaskKind,
    behavior: Behavior,
    position: Arc<Mutex<IngestPosition>>,
    starts: AtomicUsize,
    cancel: CancellationToken,
    events: EventLog,
}

impl MockTask {
    pub fn new(task_id: &str, kind: TaskKind, behavior: Behavior) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            behavior,
            position: Arc::new(Mutex::new(IngestPosition::Placeholder)),
            starts: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            events: event_log(),
        }
    }

    pub fn inventory(task_id: &str, behavior: Behavior) -> Self {
        Self::new(task_id, TaskKind::Inventory, behavior)
    }

    pub fn incremental(task_id: &str, behavior: Behavior) -> Self {
        Self::new(task_id, TaskKind::Incremental, behavior)
    }

    pub fn finished(self) -> Self {
        *self.position.lock().unwrap() = IngestPosition::Finished;
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl PipelineTask for MockTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn progress(&self) -> TaskProgress {
        TaskProgress::new(*self.position.lock().unwrap())
    }

    fn start(&self) -> Vec<TaskFuture> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("start:{}", self.task_id));

        let task_id = self.task_id.clone();
        let kind = self.kind;
        let behavior = self.behavior;
        let position = self.position.clone();
        let cancel = self.cancel.clone();
        let events = self.events.clone();

        let future = async move {
            match behavior {
                Behavior::Complete => {
                    if kind == TaskKind::Inventory {
                        *position.lock().unwrap() = IngestPosition::Finished;
                    }
                }
                Behavior::Fail(message) => return Err(TaskError::execution(task_id, message)),
                Behavior::Stream => cancel.cancelled().await,
            }
            events.lock().unwrap().push(format!("done:{task_id}"));
            Ok(())
        };
        vec![future.boxed()]
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareMode {
    Succeed,
    /// Marks every context stopping before returning.
    StopDuringInit,
    Fail(&'static str),
}

/// Hands out prebuilt tasks per sharding item.
pub struct ScriptedPreparer {
    mode: PrepareMode,
    tasks: BTreeMap<u32, Vec<Arc<MockTask>>>,
    calls: AtomicUsize,
    contexts_seen: AtomicUsize,
}

impl ScriptedPreparer {
    pub fn new(mode: PrepareMode) -> Self {
        Self {
            mode,
            tasks: BTreeMap::new(),
            calls: AtomicUsize::new(0),
            contexts_seen: AtomicUsize::new(0),
        }
    }

    pub fn with_tasks(mut self, sharding_item: u32, tasks: Vec<Arc<MockTask>>) -> Self {
        self.tasks.insert(sharding_item, tasks);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts_seen(&self) -> usize {
        self.contexts_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobPreparer for ScriptedPreparer {
    async fn init_tasks(&self, contexts: &[Arc<JobItemContext>]) -> Result<(), PrepareError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts_seen.fetch_add(contexts.len(), Ordering::SeqCst);
        if let PrepareMode::Fail(message) = self.mode {
            return Err(PrepareError::Other(message.to_string()));
        }

        for context in contexts {
            for task in self
                .tasks
                .get(&context.sharding_item())
                .into_iter()
                .flatten()
            {
                context.add_task(task.clone());
            }
            context.set_status(JobStatus::ExecuteInventoryTask);
            if self.mode == PrepareMode::StopDuringInit {
                context.set_stopping(true);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingErrorService {
    pub updates: Mutex<Vec<(String, u32, String)>>,
    pub cleans: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl JobItemErrorService for RecordingErrorService {
    async fn update(
        &self,
        job_id: &str,
        sharding_item: u32,
        error: &str,
    ) -> Result<(), GovernanceError> {
        self.updates
            .lock()
            .unwrap()
            .push((job_id.to_string(), sharding_item, error.to_string()));
        Ok(())
    }

    async fn clean(&self, job_id: &str, sharding_item: u32) -> Result<(), GovernanceError> {
        self.cleans
            .lock()
            .unwrap()
            .push((job_id.to_string(), sharding_item));
        Ok(())
    }

    async fn load(&self, _: &str, _: u32) -> Result<Option<String>, GovernanceError> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct RecordingJobApi {
    pub disabled: Mutex<Vec<String>>,
}

#[async_trait]
impl JobApi for RecordingJobApi {
    async fn disable(&self, job_id: &str) -> Result<(), GovernanceError> {
        self.disabled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Dumper serving queued batches, then reporting drained.
#[derive(Default)]
pub struct QueueDumper {
    batches: Mutex<VecDeque<Vec<DataRecord>>>,
    calls: AtomicUsize,
}

impl QueueDumper {
    pub fn with_rows(table: &str, rows: usize) -> Self {
        let batch = (0..rows)
            .map(|i| DataRecord::new(table, DataRecordType::Insert).with_column("id", i as u64))
            .collect();
        Self {
            batches: Mutex::new(VecDeque::from([batch])),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dumper for QueueDumper {
    async fn next_batch(&self, _: u32) -> Result<Option<Vec<DataRecord>>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().unwrap().pop_front())
    }
}

#[derive(Default)]
pub struct CountingImporter {
    written: AtomicUsize,
}

impl CountingImporter {
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Importer for CountingImporter {
    async fn write(&self, records: Vec<DataRecord>) -> Result<(), BoxError> {
        self.written.fetch_add(records.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out the same dumpers and importer for every request.
pub struct FixedConnector {
    pub inventory: Arc<QueueDumper>,
    pub incremental: Arc<QueueDumper>,
    pub importer: Arc<CountingImporter>,
}

impl TransmissionConnector for FixedConnector {
    fn inventory_dumper(
        &self,
        _: &DataSourceConfiguration,
        _: &TableMapping,
    ) -> Result<Arc<dyn Dumper>, BoxError> {
        Ok(self.inventory.clone())
    }

    fn incremental_dumper(
        &self,
        _: &DataSourceConfiguration,
        _: &[TableMapping],
    ) -> Result<Arc<dyn Dumper>, BoxError> {
        Ok(self.incremental.clone())
    }

    fn importer(&self, _: &DataSourceConfiguration) -> Result<Arc<dyn Importer>, BoxError> {
        Ok(self.importer.clone())
    }
}

/// Records every statement run against a data source.
#[derive(Default)]
pub struct RecordingSqlExecutor {
    statements: Mutex<Vec<String>>,
}

impl RecordingSqlExecutor {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for RecordingSqlExecutor {
    async fn execute(&self, _: &DataSourceConfiguration, sql: &str) -> Result<(), SqlError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

/// Describes every source table with the same two-column layout.
#[derive(Default)]
pub struct FixedDdlGenerator {
    tables: Mutex<Vec<String>>,
}

impl FixedDdlGenerator {
    pub fn tables(&self) -> Vec<String> {
        self.tables.lock().unwrap().clone()
    }
}

#[async_trait]
impl DdlGenerator for FixedDdlGenerator {
    async fn generate(
        &self,
        _: &DataSourceConfiguration,
        table: &QualifiedTable,
    ) -> Result<String, SqlError> {
        self.tables.lock().unwrap().push(table.table.clone());
        Ok(format!(
            "CREATE TABLE {} (order_id INT PRIMARY KEY, user_id INT)",
            table.table
        ))
    }
}

pub fn job_id(job_type: JobType, discriminator: &str) -> String {
    id::marshal(
        job_type,
        &ContextKey::new("logic_db", InstanceType::Proxy),
        discriminator,
    )
    .unwrap()
}

pub fn table_mapping(sharding_item: u32) -> TableMapping {
    let table = format!("t_order_{sharding_item}");
    TableMapping {
        logic_table: "t_order".into(),
        source_data_source: "ds_0".into(),
        source: QualifiedTable::new(None, table.as_str()),
        target: QualifiedTable::new(None, "t_order"),
    }
}

pub fn job_config(job_id: &str, sharding_count: u32) -> JobConfiguration {
    JobConfiguration {
        job_id: job_id.to_string(),
        sharding_count,
        data_node_lines: (0..sharding_count)
            .map(|item| DataNodeLine {
                mappings: vec![table_mapping(item)],
            })
            .collect(),
        sources: vec![DataSourceConfiguration {
            name: "ds_0".into(),
            database_type: DatabaseType::MySql,
            url: "mysql://localhost:3306/ds_0".into(),
        }],
        target: DataSourceConfiguration {
            name: "target".into(),
            database_type: DatabaseType::PostgreSql,
            url: "postgres://localhost:5432/target".into(),
        },
        disabled: false,
    }
}

/// A job wired to in-memory coordination, a temporary sled store and
/// recording doubles for the escalation collaborators.
pub struct Harness {
    pub job_id: String,
    pub store: MemoryCoordinationStore,
    pub governance: GovernanceFacade,
    pub errors: Arc<RecordingErrorService>,
    pub api: Arc<RecordingJobApi>,
    pub registry: Arc<JobRegistry>,
    pub barrier: Arc<DistributedBarrier>,
    pub progress: Arc<SledProgressStore>,
    pub job: PipelineJob,
    _state_dir: TempDir,
}

impl Harness {
    pub async fn new(
        job_type: JobType,
        sharding_count: u32,
        preparer: Arc<dyn JobPreparer>,
    ) -> Self {
        Self::with_sink(job_type, sharding_count, preparer, Arc::new(NoopSink)).await
    }

    pub async fn with_sink(
        job_type: JobType,
        sharding_count: u32,
        preparer: Arc<dyn JobPreparer>,
        sink: Arc<dyn PipelineSink>,
    ) -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(SledProgressStore::open(state_dir.path()).unwrap());
        Self::build(job_type, sharding_count, preparer, sink, progress, state_dir).await
    }

    /// Reuses an existing progress store, as a restarted node would.
    pub async fn resumed(
        job_type: JobType,
        sharding_count: u32,
        preparer: Arc<dyn JobPreparer>,
        progress: Arc<SledProgressStore>,
        state_dir: TempDir,
    ) -> Self {
        Self::build(
            job_type,
            sharding_count,
            preparer,
            Arc::new(NoopSink),
            progress,
            state_dir,
        )
        .await
    }

    async fn build(
        job_type: JobType,
        sharding_count: u32,
        preparer: Arc<dyn JobPreparer>,
        sink: Arc<dyn PipelineSink>,
        progress: Arc<SledProgressStore>,
        state_dir: TempDir,
    ) -> Self {
        let job_id = job_id(job_type, "scenario");
        let store = MemoryCoordinationStore::new();
        let errors = Arc::new(RecordingErrorService::default());
        let governance =
            GovernanceFacade::new(Arc::new(store.clone())).with_error_service(errors.clone());
        governance
            .job_configs()
            .persist(&job_config(&job_id, sharding_count))
            .await
            .unwrap();

        let api = Arc::new(RecordingJobApi::default());
        let registry = Arc::new(JobRegistry::new());
        let barrier = Arc::new(DistributedBarrier::new(Arc::new(store.clone())));
        let services = JobServices::new(
            governance.clone(),
            api.clone(),
            registry.clone(),
            barrier.clone(),
            preparer,
            progress.clone(),
        )
        .with_sink(sink);

        Self {
            job_id,
            store,
            governance,
            errors,
            api,
            registry,
            barrier,
            progress,
            job: PipelineJob::new(Arc::new(services)),
            _state_dir: state_dir,
        }
    }

    pub fn sharding(&self, sharding_item: u32) -> ShardingContext {
        ShardingContext::new(self.job_id.clone(), sharding_item)
    }

    pub fn status(&self, sharding_item: u32) -> Option<JobStatus> {
        self.job
            .runner_manager()
            .get_tasks_runner(sharding_item)
            .map(|runner| runner.context().status())
    }

    pub fn error_updates(&self) -> Vec<(String, u32, String)> {
        self.errors.updates.lock().unwrap().clone()
    }

    pub fn disabled_jobs(&self) -> Vec<String> {
        self.api.disabled.lock().unwrap().clone()
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
