use crate::{job::status::JobStatus, position::IngestPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted checkpoint of one job item, keyed by task id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobItemProgress {
    pub job_id: String,
    pub sharding_item: u32,
    pub status: JobStatus,
    pub inventory: BTreeMap<String, IngestPosition>,
    pub incremental: BTreeMap<String, IngestPosition>,
    pub processed_records: u64,
    pub updated_at: DateTime<Utc>,
}

impl JobItemProgress {
    pub fn new(job_id: impl Into<String>, sharding_item: u32, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            sharding_item,
            status,
            inventory: BTreeMap::new(),
            incremental: BTreeMap::new(),
            processed_records: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn inventory_position(&self, task_id: &str) -> IngestPosition {
        self.inventory.get(task_id).copied().unwrap_or_default()
    }

    pub fn incremental_position(&self, task_id: &str) -> IngestPosition {
        self.incremental.get(task_id).copied().unwrap_or_default()
    }

    pub fn inventory_finished(&self) -> bool {
        self.inventory.values().all(IngestPosition::is_finished)
    }

    /// Keeps every position already recorded as finished in `previous`.
    ///
    /// A finished task never goes back to an active position, even if a
    /// stale snapshot races a newer one into the store.
    pub fn merge_finished(&mut self, previous: &JobItemProgress) {
        for (task_id, position) in &previous.inventory {
            if position.is_finished() {
                self.inventory.insert(task_id.clone(), IngestPosition::Finished);
            }
        }
        for (task_id, position) in &previous.incremental {
            if position.is_finished() {
                self.incremental
                    .insert(task_id.clone(), IngestPosition::Finished);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_finished_positions() {
        let mut previous = JobItemProgress::new("j", 0, JobStatus::ExecuteInventoryTask);
        previous
            .inventory
            .insert("t1".into(), IngestPosition::Finished);

        let mut next = JobItemProgress::new("j", 0, JobStatus::ExecuteInventoryTask);
        next.inventory.insert("t1".into(), IngestPosition::Placeholder);
        next.inventory.insert("t2".into(), IngestPosition::Placeholder);
        next.merge_finished(&previous);

        assert_eq!(next.inventory_position("t1"), IngestPosition::Finished);
        assert_eq!(next.inventory_position("t2"), IngestPosition::Placeholder);
        assert!(!next.inventory_finished());
    }

    #[test]
    fn unknown_task_defaults_to_placeholder() {
        let progress = JobItemProgress::new("j", 1, JobStatus::Preparing);
        assert_eq!(
            progress.incremental_position("missing"),
            IngestPosition::Placeholder
        );
        assert!(progress.inventory_finished());
    }
}
