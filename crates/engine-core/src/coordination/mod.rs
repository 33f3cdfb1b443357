use crate::error::CoordinationError;
use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod memory;
pub mod paths;

pub use memory::MemoryCoordinationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub value: String,
    pub change_type: ChangeType,
}

/// Hierarchical key/value store shared by every node of the cluster.
///
/// Keys are `/`-separated absolute paths. Parents are implicit: persisting
/// `/a/b/c` makes `b` a child of `/a` without `/a/b` holding a value.
/// Ephemeral keys belong to the client session that wrote them and vanish
/// when that session ends.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    async fn persist(&self, key: &str, value: &str) -> Result<(), CoordinationError>;

    async fn persist_ephemeral(&self, key: &str, value: &str) -> Result<(), CoordinationError>;

    /// Deletes `key` together with everything below it.
    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;

    /// Names (last path segment) of the direct children of `key`.
    async fn get_children_keys(&self, key: &str) -> Result<Vec<String>, CoordinationError>;

    /// Stream of every change made through any session of the store.
    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;
}
