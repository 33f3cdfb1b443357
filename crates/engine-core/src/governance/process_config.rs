use crate::{
    coordination::{CoordinationStore, paths},
    error::GovernanceError,
};
use model::{job::JobType, process::ProcessConfiguration};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProcessConfigurationService {
    store: Arc<dyn CoordinationStore>,
}

impl ProcessConfigurationService {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Loads the process configuration of `job_type` with defaults filled in.
    pub async fn load(&self, job_type: JobType) -> Result<ProcessConfiguration, GovernanceError> {
        let raw = self.store.get(&paths::process_config_path(job_type)).await?;
        let config = match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => ProcessConfiguration::default(),
        };
        Ok(config.fill_defaults())
    }

    pub async fn persist(
        &self,
        job_type: JobType,
        config: &ProcessConfiguration,
    ) -> Result<(), GovernanceError> {
        let raw = serde_json::to_string(config)?;
        self.store
            .persist(&paths::process_config_path(job_type), &raw)
            .await?;
        Ok(())
    }
}
