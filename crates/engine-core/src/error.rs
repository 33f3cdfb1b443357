use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Coordination session {0} is closed")]
    SessionClosed(u64),

    #[error("Invalid coordination path '{0}'")]
    InvalidPath(String),
}

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Failed to (de)serialize governance document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job configuration not found for job '{0}'")]
    JobNotFound(String),
}

#[derive(Error, Debug)]
pub enum ProgressStoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode job item progress: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Failed to save progress for job '{job_id}' item {sharding_item}: {message}")]
    Save {
        job_id: String,
        sharding_item: u32,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Unknown rate limit algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("Invalid rate limit property '{key}' = '{value}'")]
    InvalidProperty { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to encode response frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Sink channel is closed")]
    ChannelClosed,

    #[error("Sink channel is full")]
    ChannelFull,
}
