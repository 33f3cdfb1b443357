use crate::error::ProgressStoreError;
use async_trait::async_trait;
use model::job::JobItemProgress;

pub mod sled_store;

pub use sled_store::SledProgressStore;

/// Durable checkpoints of job items, read back when a job item restarts.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Saves `progress`, never regressing a task that is already finished.
    async fn save_progress(&self, progress: &JobItemProgress) -> Result<(), ProgressStoreError>;

    async fn load_progress(
        &self,
        job_id: &str,
        sharding_item: u32,
    ) -> Result<Option<JobItemProgress>, ProgressStoreError>;

    async fn list_items(&self, job_id: &str) -> Result<Vec<u32>, ProgressStoreError>;

    async fn delete_job(&self, job_id: &str) -> Result<(), ProgressStoreError>;
}
