use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a task stands in its source stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestPosition {
    /// Still progressing. Streaming tasks stay here until the job stops.
    #[default]
    Placeholder,

    /// The source is fully drained; the task must not be started again.
    Finished,
}

impl IngestPosition {
    pub fn is_finished(&self) -> bool {
        matches!(self, IngestPosition::Finished)
    }
}

impl fmt::Display for IngestPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestPosition::Placeholder => f.write_str("placeholder"),
            IngestPosition::Finished => f.write_str("finished"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Bounded copy of an existing snapshot.
    Inventory,
    /// Unbounded stream of changes after the snapshot point.
    Incremental,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Inventory => f.write_str("inventory"),
            TaskKind::Incremental => f.write_str("incremental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskProgress {
    pub position: IngestPosition,
    pub processed_records: u64,
}

impl TaskProgress {
    pub fn new(position: IngestPosition) -> Self {
        Self {
            position,
            processed_records: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position.is_finished()
    }
}
