use crate::{
    coordination::{CoordinationStore, paths},
    error::GovernanceError,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Last error of each job item, kept for operators.
#[async_trait]
pub trait JobItemErrorService: Send + Sync {
    async fn update(
        &self,
        job_id: &str,
        sharding_item: u32,
        error: &str,
    ) -> Result<(), GovernanceError>;

    async fn clean(&self, job_id: &str, sharding_item: u32) -> Result<(), GovernanceError>;

    async fn load(&self, job_id: &str, sharding_item: u32)
    -> Result<Option<String>, GovernanceError>;
}

pub struct StoreJobItemErrorService {
    store: Arc<dyn CoordinationStore>,
}

impl StoreJobItemErrorService {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobItemErrorService for StoreJobItemErrorService {
    async fn update(
        &self,
        job_id: &str,
        sharding_item: u32,
        error: &str,
    ) -> Result<(), GovernanceError> {
        let path = paths::job_item_error_path(job_id, sharding_item);
        self.store.persist(&path, error).await?;
        Ok(())
    }

    async fn clean(&self, job_id: &str, sharding_item: u32) -> Result<(), GovernanceError> {
        let path = paths::job_item_error_path(job_id, sharding_item);
        self.store.persist(&path, "").await?;
        Ok(())
    }

    async fn load(
        &self,
        job_id: &str,
        sharding_item: u32,
    ) -> Result<Option<String>, GovernanceError> {
        let path = paths::job_item_error_path(job_id, sharding_item);
        let value = self.store.get(&path).await?;
        Ok(value.filter(|v| !v.is_empty()))
    }
}
