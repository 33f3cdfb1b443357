use crate::{error::TaskError, task::PipelineTask};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug};

/// Receives the joint outcome of a group of triggered tasks.
#[async_trait]
pub trait ExecuteCallback: Send + Sync {
    async fn on_success(&self);

    async fn on_failure(&self, error: TaskError);
}

/// Runs task futures on the tokio runtime and reports their joint result.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecuteEngine;

impl ExecuteEngine {
    pub fn new() -> Self {
        Self
    }

    /// Starts every task, spawns each returned future and, once all of them
    /// have completed, calls `on_success` or, on the first failure,
    /// `on_failure`. Never blocks the caller and never retries.
    ///
    /// The returned handle resolves after the callback has run.
    pub fn trigger(
        &self,
        tasks: &[Arc<dyn PipelineTask>],
        callback: Arc<dyn ExecuteCallback>,
    ) -> JoinHandle<()> {
        let handles: Vec<_> = tasks
            .iter()
            .flat_map(|task| task.start())
            .map(|future| tokio::spawn(future.in_current_span()))
            .collect();

        debug!(tasks = tasks.len(), futures = handles.len(), "Triggered tasks");

        tokio::spawn(
            async move {
                let joined = try_join_all(handles.into_iter().map(|handle| async move {
                    handle.await?
                }))
                .await;

                match joined {
                    Ok(_) => callback.on_success().await,
                    Err(e) => callback.on_failure(e).await,
                }
            }
            .in_current_span(),
        )
    }
}
