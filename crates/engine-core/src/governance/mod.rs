use crate::coordination::CoordinationStore;
use std::sync::Arc;

pub mod error_message;
pub mod job_config;
pub mod process_config;

pub use error_message::{JobItemErrorService, StoreJobItemErrorService};
pub use job_config::JobConfigurationService;
pub use process_config::ProcessConfigurationService;

/// Entry point to the job metadata kept in the coordination store.
#[derive(Clone)]
pub struct GovernanceFacade {
    errors: Arc<dyn JobItemErrorService>,
    job_configs: JobConfigurationService,
    process_configs: ProcessConfigurationService,
}

impl GovernanceFacade {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            errors: Arc::new(StoreJobItemErrorService::new(store.clone())),
            job_configs: JobConfigurationService::new(store.clone()),
            process_configs: ProcessConfigurationService::new(store),
        }
    }

    /// Replaces the error-message service, e.g. to mirror errors elsewhere.
    pub fn with_error_service(mut self, errors: Arc<dyn JobItemErrorService>) -> Self {
        self.errors = errors;
        self
    }

    pub fn errors(&self) -> &Arc<dyn JobItemErrorService> {
        &self.errors
    }

    pub fn job_configs(&self) -> &JobConfigurationService {
        &self.job_configs
    }

    pub fn process_configs(&self) -> &ProcessConfigurationService {
        &self.process_configs
    }
}
