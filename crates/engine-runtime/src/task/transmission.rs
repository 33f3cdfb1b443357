use crate::{
    context::TransmissionProcessContext,
    error::{BoxError, TaskError},
    task::{PipelineTask, TaskFuture},
};
use async_trait::async_trait;
use engine_core::ratelimit::StatementKind;
use futures::FutureExt;
use model::{
    position::{IngestPosition, TaskKind, TaskProgress},
    record::DataRecord,
};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads records from the source side of a task.
#[async_trait]
pub trait Dumper: Send + Sync {
    /// Next batch of at most `batch_size` records, or `None` once the
    /// source is drained. Streaming dumpers never return `None`.
    async fn next_batch(&self, batch_size: u32) -> Result<Option<Vec<DataRecord>>, BoxError>;
}

/// Writes records to the target side of a task.
#[async_trait]
pub trait Importer: Send + Sync {
    async fn write(&self, records: Vec<DataRecord>) -> Result<(), BoxError>;
}

/// A dumper feeding an importer through a bounded channel.
///
/// `start` hands out two futures, one per side. An inventory task records
/// its position as finished only when the dumper reached the end of its
/// source and the importer has written everything it produced.
pub struct TransmissionTask {
    task_id: String,
    kind: TaskKind,
    dumper: Arc<dyn Dumper>,
    importer: Arc<dyn Importer>,
    process: Arc<TransmissionProcessContext>,
    progress: Arc<Mutex<TaskProgress>>,
    cancel: CancellationToken,
}

impl TransmissionTask {
    pub fn new(
        task_id: impl Into<String>,
        kind: TaskKind,
        dumper: Arc<dyn Dumper>,
        importer: Arc<dyn Importer>,
        process: Arc<TransmissionProcessContext>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            dumper,
            importer,
            process,
            progress: Arc::new(Mutex::new(TaskProgress::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Resumes the task at a previously persisted position.
    pub fn with_position(self, position: IngestPosition) -> Self {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .position = position;
        self
    }

    fn dump(&self, tx: mpsc::Sender<Vec<DataRecord>>, drained: Arc<AtomicBool>) -> TaskFuture {
        let task_id = self.task_id.clone();
        let dumper = self.dumper.clone();
        let cancel = self.cancel.clone();
        let limiter = self.process.read_rate_limiter().cloned();
        let batch_size = self.process.config().read_batch_size();

        async move {
            loop {
                let batch = tokio::select! {
                    _ = cancel.cancelled() => break,
                    batch = dumper.next_batch(batch_size) => {
                        batch.map_err(|e| TaskError::execution(task_id.as_str(), e))?
                    }
                };

                let Some(records) = batch else {
                    debug!(task_id = %task_id, "Dumper drained");
                    drained.store(true, Ordering::Release);
                    break;
                };

                if let Some(limiter) = &limiter {
                    limiter.intercept(StatementKind::Select, 1).await;
                }

                // The importer has gone away; its own future reports why.
                if tx.send(records).await.is_err() {
                    break;
                }
            }
            Ok::<(), TaskError>(())
        }
        .boxed()
    }

    fn import(
        &self,
        mut rx: mpsc::Receiver<Vec<DataRecord>>,
        drained: Arc<AtomicBool>,
    ) -> TaskFuture {
        let task_id = self.task_id.clone();
        let kind = self.kind;
        let importer = self.importer.clone();
        let cancel = self.cancel.clone();
        let progress = self.progress.clone();
        let limiter = self.process.write_rate_limiter().cloned();
        let batch_size = self.process.config().write_batch_size().max(1) as usize;

        async move {
            while let Some(records) = rx.recv().await {
                for chunk in records.chunks(batch_size) {
                    if let (Some(limiter), Some(first)) = (&limiter, chunk.first()) {
                        limiter.intercept(first.record_type.into(), 1).await;
                    }

                    importer
                        .write(chunk.to_vec())
                        .await
                        .map_err(|e| TaskError::execution(task_id.as_str(), e))?;

                    let mut state = progress.lock().unwrap_or_else(PoisonError::into_inner);
                    state.processed_records += chunk.len() as u64;
                }
            }

            // A closed channel alone does not mean the source is exhausted:
            // the dumper may have failed or been stopped.
            if kind == TaskKind::Inventory
                && drained.load(Ordering::Acquire)
                && !cancel.is_cancelled()
            {
                let mut state = progress.lock().unwrap_or_else(PoisonError::into_inner);
                state.position = IngestPosition::Finished;
                info!(
                    task_id = %task_id,
                    records = state.processed_records,
                    "Inventory task finished"
                );
            }
            Ok::<(), TaskError>(())
        }
        .boxed()
    }
}

impl PipelineTask for TransmissionTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn progress(&self) -> TaskProgress {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) -> Vec<TaskFuture> {
        let (tx, rx) = mpsc::channel(self.process.config().block_queue_size());
        info!(task_id = %self.task_id, kind = %self.kind, "Start task");
        let drained = Arc::new(AtomicBool::new(false));
        vec![self.dump(tx, drained.clone()), self.import(rx, drained)]
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
