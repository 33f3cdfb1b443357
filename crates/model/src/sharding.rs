use serde::{Deserialize, Serialize};

/// Assignment handed to a job by the external scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingContext {
    pub job_id: String,
    pub sharding_item: u32,
    #[serde(default)]
    pub job_parameter: String,
}

impl ShardingContext {
    pub fn new(job_id: impl Into<String>, sharding_item: u32) -> Self {
        Self {
            job_id: job_id.into(),
            sharding_item,
            job_parameter: String::new(),
        }
    }
}
