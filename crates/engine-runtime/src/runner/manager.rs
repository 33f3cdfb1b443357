use crate::context::JobItemContext;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, info};

/// Drives the tasks of one sharding item.
pub struct TasksRunner {
    context: Arc<JobItemContext>,
}

impl TasksRunner {
    pub fn new(context: Arc<JobItemContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<JobItemContext> {
        &self.context
    }

    /// Marks the item stopping and asks every task to wind down.
    pub fn stop(&self) {
        self.context.set_stopping(true);
        for task in self.context.all_tasks() {
            task.stop();
        }
        debug!(
            job_id = self.context.job_id(),
            sharding_item = self.context.sharding_item(),
            "Stopped tasks runner"
        );
    }
}

/// Runners of the sharding items a job drives on this node.
#[derive(Default)]
pub struct JobRunnerManager {
    runners: RwLock<BTreeMap<u32, Arc<TasksRunner>>>,
    stopping: AtomicBool,
}

impl JobRunnerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `runner` for `sharding_item`.
    ///
    /// Returns `false` when the item already has a runner or the manager
    /// is stopping; the caller must then leave the item alone.
    pub fn add_tasks_runner(&self, sharding_item: u32, runner: Arc<TasksRunner>) -> bool {
        let mut runners = self.runners.write().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a concurrent stop either sees this
        // runner or rejects it.
        if self.is_stopping() || runners.contains_key(&sharding_item) {
            return false;
        }
        runners.insert(sharding_item, runner);
        true
    }

    pub fn get_tasks_runner(&self, sharding_item: u32) -> Option<Arc<TasksRunner>> {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sharding_item)
            .cloned()
    }

    pub fn remove_tasks_runner(&self, sharding_item: u32) -> Option<Arc<TasksRunner>> {
        self.runners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&sharding_item)
    }

    pub fn sharding_items(&self) -> Vec<u32> {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Stops every runner. Later registrations are refused.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);

        let runners: Vec<Arc<TasksRunner>> = {
            let mut runners = self.runners.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *runners).into_values().collect()
        };
        info!(runners = runners.len(), "Stopping job runners");

        for runner in runners {
            runner.stop();
        }
    }
}
