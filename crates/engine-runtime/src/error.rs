use crate::prepare::datasource::SqlError;
use engine_core::error::{CoordinationError, GovernanceError, ProgressStoreError, RateLimitError};
use model::job::JobIdError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of one future started by a pipeline task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task '{task_id}' failed: {source}")]
    Execution {
        task_id: String,
        #[source]
        source: BoxError,
    },

    /// The spawned future panicked or was cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TaskError {
    pub fn execution(task_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        TaskError::Execution {
            task_id: task_id.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),

    #[error("Failed to generate DDL for table '{table}': {message}")]
    Ddl { table: String, message: String },

    #[error("Data source '{0}' is not configured")]
    MissingDataSource(String),

    #[error("Failed to create tasks: {0}")]
    TaskCreation(String),

    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressStoreError),

    #[error("{0}")]
    Other(String),
}

/// Errors the scheduler observes from `PipelineJob::execute`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job id: {0}")]
    JobId(#[from] JobIdError),

    #[error("Governance error: {0}")]
    Governance(#[from] GovernanceError),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Progress store error: {0}")]
    Progress(#[from] ProgressStoreError),

    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Failed to prepare job '{job_id}': {source}")]
    Prepare {
        job_id: String,
        #[source]
        source: PrepareError,
    },

    #[error("Sharding item {sharding_item} is out of range for job '{job_id}' ({sharding_count} items)")]
    InvalidShardingItem {
        job_id: String,
        sharding_item: u32,
        sharding_count: u32,
    },
}
