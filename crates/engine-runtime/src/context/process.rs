use engine_core::{
    error::RateLimitError,
    ratelimit::{SharedRateLimiter, build_rate_limiter},
};
use model::process::ProcessConfiguration;

/// Process configuration of one job together with the limiters built from it.
/// Shared by every item and task of the job.
pub struct TransmissionProcessContext {
    config: ProcessConfiguration,
    read_rate_limiter: Option<SharedRateLimiter>,
    write_rate_limiter: Option<SharedRateLimiter>,
}

impl TransmissionProcessContext {
    pub fn new(config: ProcessConfiguration) -> Result<Self, RateLimitError> {
        let config = config.fill_defaults();
        let read_rate_limiter = config
            .read
            .rate_limiter
            .as_ref()
            .map(build_rate_limiter)
            .transpose()?;
        let write_rate_limiter = config
            .write
            .rate_limiter
            .as_ref()
            .map(build_rate_limiter)
            .transpose()?;

        Ok(Self {
            config,
            read_rate_limiter,
            write_rate_limiter,
        })
    }

    pub fn config(&self) -> &ProcessConfiguration {
        &self.config
    }

    pub fn read_rate_limiter(&self) -> Option<&SharedRateLimiter> {
        self.read_rate_limiter.as_ref()
    }

    pub fn write_rate_limiter(&self) -> Option<&SharedRateLimiter> {
        self.write_rate_limiter.as_ref()
    }
}
