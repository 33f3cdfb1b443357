use crate::{
    barrier::{DistributedBarrier, barrier_disable_path, barrier_enable_path},
    error::JobError,
    runner::JobRegistry,
};
use async_trait::async_trait;
use engine_core::{
    coordination::{ChangeType, CoordinationStore, paths},
    error::GovernanceError,
    governance::GovernanceFacade,
};
use model::job::JobConfiguration;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{info, warn};

#[async_trait]
pub trait JobApi: Send + Sync {
    /// Marks the job disabled cluster-wide.
    async fn disable(&self, job_id: &str) -> Result<(), GovernanceError>;
}

/// Job operations backed by the persisted job configuration.
pub struct GovernanceJobApi {
    governance: GovernanceFacade,
    barrier: Arc<DistributedBarrier>,
}

impl GovernanceJobApi {
    pub fn new(governance: GovernanceFacade, barrier: Arc<DistributedBarrier>) -> Self {
        Self {
            governance,
            barrier,
        }
    }

    /// Enables the job and waits until every sharding item has acknowledged.
    ///
    /// Returns whether all items arrived within `timeout`.
    pub async fn start(&self, job_id: &str, timeout: Duration) -> Result<bool, JobError> {
        self.toggle(job_id, false, &barrier_enable_path(job_id), timeout)
            .await
    }

    /// Disables the job and waits until every sharding item has stopped.
    pub async fn stop(&self, job_id: &str, timeout: Duration) -> Result<bool, JobError> {
        self.toggle(job_id, true, &barrier_disable_path(job_id), timeout)
            .await
    }

    async fn toggle(
        &self,
        job_id: &str,
        disabled: bool,
        barrier_path: &str,
        timeout: Duration,
    ) -> Result<bool, JobError> {
        let config = self.governance.job_configs().load(job_id).await?;
        self.barrier
            .register(barrier_path, config.sharding_count as usize)
            .await?;
        self.governance
            .job_configs()
            .set_disabled(job_id, disabled)
            .await?;

        let acknowledged = self.barrier.await_barrier(barrier_path, timeout).await;
        self.barrier.remove_parent_node(barrier_path).await?;

        info!(job_id, disabled, acknowledged, "Toggled job");
        Ok(acknowledged)
    }
}

#[async_trait]
impl JobApi for GovernanceJobApi {
    async fn disable(&self, job_id: &str) -> Result<(), GovernanceError> {
        self.governance.job_configs().set_disabled(job_id, true).await?;
        info!(job_id, "Disabled job");
        Ok(())
    }
}

/// Stops local jobs whose configuration becomes disabled and acknowledges
/// the stop on the job's disable barrier, once per item that was running.
pub fn watch_disabled_jobs(
    store: Arc<dyn CoordinationStore>,
    registry: Arc<JobRegistry>,
    barrier: Arc<DistributedBarrier>,
) -> JoinHandle<()> {
    let mut events = store.watch();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Job config watcher lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if event.change_type == ChangeType::Deleted {
                continue;
            }
            let Some(job_id) = paths::job_id_of_config_path(&event.key) else {
                continue;
            };
            let config: JobConfiguration = match serde_json::from_str(&event.value) {
                Ok(config) => config,
                Err(e) => {
                    warn!(job_id, error = %e, "Ignoring unreadable job configuration");
                    continue;
                }
            };
            if !config.disabled {
                continue;
            }
            let Some(manager) = registry.get(job_id) else {
                continue;
            };

            let items = manager.sharding_items();
            registry.stop(job_id);

            let path = barrier_disable_path(job_id);
            for item in items {
                if let Err(e) = barrier.persist_ephemeral_children_node(&path, item).await {
                    warn!(job_id, sharding_item = item, error = %e, "Failed to acknowledge stop");
                }
            }
        }
    })
}
