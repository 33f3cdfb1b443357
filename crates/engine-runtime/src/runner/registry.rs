use crate::runner::JobRunnerManager;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::info;

/// Jobs currently running on this node.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobRunnerManager>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `job_id` is already registered.
    pub fn add(&self, job_id: &str, manager: Arc<JobRunnerManager>) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(job_id) {
            return false;
        }
        jobs.insert(job_id.to_string(), manager);
        true
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<JobRunnerManager>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_id)
    }

    /// Removes and stops the job. Unknown ids are ignored.
    pub fn stop(&self, job_id: &str) {
        info!(job_id, "Stop job");
        let manager = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
        if let Some(manager) = manager {
            manager.stop();
        }
    }

    pub fn stop_all(&self) {
        for job_id in self.running_job_ids() {
            self.stop(&job_id);
        }
    }

    pub fn running_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
