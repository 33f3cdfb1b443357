use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single job item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Preparing,
    ExecuteInventoryTask,
    ExecuteIncrementalTask,
    Finished,
    PrepareFailure,
    ExecuteFailure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Preparing => "PREPARING",
            JobStatus::ExecuteInventoryTask => "EXECUTE_INVENTORY_TASK",
            JobStatus::ExecuteIncrementalTask => "EXECUTE_INCREMENTAL_TASK",
            JobStatus::Finished => "FINISHED",
            JobStatus::PrepareFailure => "PREPARE_FAILURE",
            JobStatus::ExecuteFailure => "EXECUTE_FAILURE",
        }
    }

    /// True once the item has moved past the snapshot copy.
    pub fn is_past_inventory(&self) -> bool {
        matches!(
            self,
            JobStatus::ExecuteIncrementalTask | JobStatus::Finished
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
