use engine_core::error::ProgressStoreError;
use model::job::JobIdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid job id: {0}")]
    JobId(#[from] JobIdError),

    #[error("Failed to open progress store at {path}: {source}")]
    StoreOpen {
        path: String,
        #[source]
        source: ProgressStoreError,
    },

    #[error("Failed to load progress: {0}")]
    Progress(#[from] ProgressStoreError),

    #[error("No progress recorded for job '{job_id}' item {sharding_item}")]
    ProgressNotFound { job_id: String, sharding_item: u32 },

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
