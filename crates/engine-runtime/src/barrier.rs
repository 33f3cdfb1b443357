//! Cluster-wide barrier built on ephemeral coordination-store nodes.
//!
//! Each participating sharding item persists an ephemeral child under the
//! barrier's parent path. The node that registered the barrier waits until
//! the number of live children reaches the registered total.

use engine_core::{
    coordination::{ChangeEvent, CoordinationStore, paths},
    error::CoordinationError,
};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use engine_core::coordination::paths::{barrier_disable_path, barrier_enable_path};

struct BarrierHolder {
    total_count: usize,
    latch: CancellationToken,
}

pub struct DistributedBarrier {
    store: Arc<dyn CoordinationStore>,
    holders: RwLock<HashMap<String, Arc<BarrierHolder>>>,
}

impl DistributedBarrier {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            holders: RwLock::new(HashMap::new()),
        }
    }

    /// Persists the parent node and prepares the local latch. Registering
    /// an already registered path keeps the existing latch.
    pub async fn register(
        &self,
        parent_path: &str,
        total_count: usize,
    ) -> Result<(), CoordinationError> {
        self.store.persist(parent_path, "").await?;
        {
            let mut holders = self.holders.write().unwrap_or_else(PoisonError::into_inner);
            holders
                .entry(parent_path.to_string())
                .or_insert_with(|| {
                    Arc::new(BarrierHolder {
                        total_count,
                        latch: CancellationToken::new(),
                    })
                });
        }
        debug!(path = parent_path, total_count, "Registered barrier");

        // Children may have arrived before this node registered.
        self.recount(parent_path).await
    }

    /// Replaces the ephemeral child node of `sharding_item`.
    pub async fn persist_ephemeral_children_node(
        &self,
        parent_path: &str,
        sharding_item: u32,
    ) -> Result<(), CoordinationError> {
        let key = format!("{parent_path}/{sharding_item}");
        self.store.delete(&key).await?;
        self.store.persist_ephemeral(&key, "").await
    }

    /// Waits for the barrier at `parent_path` to be released.
    ///
    /// Returns `false` when the path is not registered on this node or the
    /// timeout elapses first.
    pub async fn await_barrier(&self, parent_path: &str, wait: Duration) -> bool {
        let Some(holder) = self.holder(parent_path) else {
            warn!(path = parent_path, "Barrier is not registered");
            return false;
        };

        match timeout(wait, holder.latch.cancelled()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(path = parent_path, ?wait, "Barrier await timed out");
                false
            }
        }
    }

    /// Reacts to a change under the jobs root. Keys that are not barrier
    /// children are ignored.
    pub async fn check_children_node_count(
        &self,
        event: &ChangeEvent,
    ) -> Result<(), CoordinationError> {
        if event.key.is_empty() || !paths::is_barrier_child_path(&event.key) {
            return Ok(());
        }
        let Some(parent_path) = paths::parent_path(&event.key) else {
            return Ok(());
        };
        self.recount(parent_path).await
    }

    /// Deletes the barrier nodes and releases anyone still waiting on them.
    pub async fn remove_parent_node(&self, parent_path: &str) -> Result<(), CoordinationError> {
        let deleted = self.store.delete(parent_path).await;

        let holder = self
            .holders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(parent_path);
        if let Some(holder) = holder {
            holder.latch.cancel();
        }

        deleted
    }

    /// Feeds every store change into [`Self::check_children_node_count`].
    pub fn watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.store.watch();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.check_children_node_count(&event).await {
                            warn!(key = %event.key, error = %e, "Failed to recount barrier children");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Barrier watcher lagged behind, recounting all barriers");
                        self.recount_all().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn is_registered(&self, parent_path: &str) -> bool {
        self.holder(parent_path).is_some()
    }

    fn holder(&self, parent_path: &str) -> Option<Arc<BarrierHolder>> {
        self.holders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(parent_path)
            .cloned()
    }

    async fn recount(&self, parent_path: &str) -> Result<(), CoordinationError> {
        let Some(holder) = self.holder(parent_path) else {
            return Ok(());
        };
        if holder.latch.is_cancelled() {
            return Ok(());
        }

        let children = self.store.get_children_keys(parent_path).await?;
        if children.len() == holder.total_count {
            info!(
                path = parent_path,
                total_count = holder.total_count,
                "Barrier released"
            );
            holder.latch.cancel();
        }
        Ok(())
    }

    async fn recount_all(&self) {
        let paths: Vec<String> = self
            .holders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        for path in paths {
            if let Err(e) = self.recount(&path).await {
                warn!(path = %path, error = %e, "Failed to recount barrier children");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::coordination::MemoryCoordinationStore;

    fn barrier(store: &MemoryCoordinationStore) -> Arc<DistributedBarrier> {
        let barrier = Arc::new(DistributedBarrier::new(Arc::new(store.clone())));
        let _ = barrier.clone().watch();
        barrier
    }

    #[tokio::test]
    async fn releases_when_every_item_arrives() {
        let store = MemoryCoordinationStore::new();
        let barrier = barrier(&store);
        let path = barrier_enable_path("j1");

        barrier.register(&path, 2).await.unwrap();
        barrier.persist_ephemeral_children_node(&path, 0).await.unwrap();
        assert!(!barrier.await_barrier(&path, Duration::from_millis(50)).await);

        barrier.persist_ephemeral_children_node(&path, 1).await.unwrap();
        assert!(barrier.await_barrier(&path, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn arrival_order_does_not_matter() {
        let store = MemoryCoordinationStore::new();
        let barrier = barrier(&store);
        let path = barrier_disable_path("j2");
        barrier.register(&path, 3).await.unwrap();

        for item in [2, 0, 1] {
            barrier
                .persist_ephemeral_children_node(&path, item)
                .await
                .unwrap();
        }
        assert!(barrier.await_barrier(&path, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn repeated_child_counts_once() {
        let store = MemoryCoordinationStore::new();
        let barrier = barrier(&store);
        let path = barrier_enable_path("j3");
        barrier.register(&path, 2).await.unwrap();

        barrier.persist_ephemeral_children_node(&path, 0).await.unwrap();
        barrier.persist_ephemeral_children_node(&path, 0).await.unwrap();
        assert!(!barrier.await_barrier(&path, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn children_persisted_before_register_are_counted() {
        let store = MemoryCoordinationStore::new();
        let barrier = barrier(&store);
        let path = barrier_enable_path("j4");

        barrier.persist_ephemeral_children_node(&path, 0).await.unwrap();
        barrier.register(&path, 1).await.unwrap();
        assert!(barrier.await_barrier(&path, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn removal_releases_waiter() {
        let store = MemoryCoordinationStore::new();
        let barrier = barrier(&store);
        let path = barrier_enable_path("j5");
        barrier.register(&path, 2).await.unwrap();

        let waiter = {
            let barrier = barrier.clone();
            let path = path.clone();
            tokio::spawn(async move { barrier.await_barrier(&path, Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;

        barrier.remove_parent_node(&path).await.unwrap();
        assert!(waiter.await.unwrap());
        assert!(!barrier.is_registered(&path));
        assert!(store.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unregistered_path_and_foreign_keys_are_ignored() {
        let store = MemoryCoordinationStore::new();
        let barrier = DistributedBarrier::new(Arc::new(store.clone()));
        assert!(!barrier.await_barrier("/pipeline/jobs/x/barrier/enable", Duration::ZERO).await);

        let event = ChangeEvent {
            key: "/pipeline/jobs/x/items/0/error".into(),
            value: String::new(),
            change_type: engine_core::coordination::ChangeType::Added,
        };
        barrier.check_children_node_count(&event).await.unwrap();
    }

    #[tokio::test]
    async fn closed_session_drops_its_children() {
        let store = MemoryCoordinationStore::new();
        let shard = store.session();
        let path = barrier_enable_path("j6");

        let registrar = barrier(&store);
        let participant = DistributedBarrier::new(Arc::new(shard.clone()));
        registrar.register(&path, 2).await.unwrap();

        participant
            .persist_ephemeral_children_node(&path, 0)
            .await
            .unwrap();
        shard.close_session();
        registrar
            .persist_ephemeral_children_node(&path, 1)
            .await
            .unwrap();

        assert!(!registrar.await_barrier(&path, Duration::from_millis(50)).await);
    }
}
