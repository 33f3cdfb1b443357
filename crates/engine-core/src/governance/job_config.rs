use crate::{
    coordination::{CoordinationStore, paths},
    error::GovernanceError,
};
use model::job::JobConfiguration;
use std::sync::Arc;

/// Job configurations, stored as JSON under `/pipeline/jobs/{job_id}/config`.
#[derive(Clone)]
pub struct JobConfigurationService {
    store: Arc<dyn CoordinationStore>,
}

impl JobConfigurationService {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, job_id: &str) -> Result<JobConfiguration, GovernanceError> {
        let raw = self
            .store
            .get(&paths::job_config_path(job_id))
            .await?
            .ok_or_else(|| GovernanceError::JobNotFound(job_id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn persist(&self, config: &JobConfiguration) -> Result<(), GovernanceError> {
        let raw = serde_json::to_string(config)?;
        self.store
            .persist(&paths::job_config_path(&config.job_id), &raw)
            .await?;
        Ok(())
    }

    pub async fn set_disabled(&self, job_id: &str, disabled: bool) -> Result<(), GovernanceError> {
        let mut config = self.load(job_id).await?;
        config.disabled = disabled;
        self.persist(&config).await
    }
}
