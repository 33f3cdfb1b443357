use crate::{
    coordination::{ChangeEvent, ChangeType, CoordinationStore},
    error::CoordinationError,
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Node {
    value: String,
    /// Session that owns the node when it is ephemeral.
    owner: Option<u64>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    closed_sessions: HashSet<u64>,
}

struct Shared {
    tree: Mutex<Tree>,
    events: broadcast::Sender<ChangeEvent>,
    next_session: AtomicU64,
}

/// In-process coordination store.
///
/// Every clone obtained through [`MemoryCoordinationStore::session`] sees
/// the same tree but owns its own ephemeral nodes, the way separate cluster
/// nodes hold separate connections to a shared registry.
#[derive(Clone)]
pub struct MemoryCoordinationStore {
    shared: Arc<Shared>,
    session_id: u64,
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            tree: Mutex::new(Tree::default()),
            events,
            next_session: AtomicU64::new(1),
        });

        Self {
            shared,
            session_id: 0,
        }
    }

    /// Opens another session on the same tree.
    pub fn session(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            session_id: self.shared.next_session.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Ends the session, dropping every ephemeral node it owns.
    pub fn close_session(&self) {
        let mut tree = self.lock();
        if !tree.closed_sessions.insert(self.session_id) {
            return;
        }

        let owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(self.session_id))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &owned {
            if let Some(node) = tree.nodes.remove(key) {
                self.emit(key, node.value, ChangeType::Deleted);
            }
        }

        debug!(
            session_id = self.session_id,
            removed = owned.len(),
            "Closed coordination session"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.shared.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_open(&self, tree: &Tree) -> Result<(), CoordinationError> {
        if tree.closed_sessions.contains(&self.session_id) {
            return Err(CoordinationError::SessionClosed(self.session_id));
        }
        Ok(())
    }

    fn emit(&self, key: &str, value: String, change_type: ChangeType) {
        // No subscribers is not an error.
        let _ = self.shared.events.send(ChangeEvent {
            key: key.to_string(),
            value,
            change_type,
        });
    }

    fn put(&self, key: &str, value: &str, owner: Option<u64>) -> Result<(), CoordinationError> {
        validate_path(key)?;
        let mut tree = self.lock();
        self.check_open(&tree)?;

        let change_type = if tree.nodes.contains_key(key) {
            ChangeType::Updated
        } else {
            ChangeType::Added
        };
        tree.nodes.insert(
            key.to_string(),
            Node {
                value: value.to_string(),
                owner,
            },
        );
        self.emit(key, value.to_string(), change_type);
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        validate_path(key)?;
        let tree = self.lock();
        self.check_open(&tree)?;
        Ok(tree.nodes.get(key).map(|node| node.value.clone()))
    }

    async fn persist(&self, key: &str, value: &str) -> Result<(), CoordinationError> {
        self.put(key, value, None)
    }

    async fn persist_ephemeral(&self, key: &str, value: &str) -> Result<(), CoordinationError> {
        self.put(key, value, Some(self.session_id))
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        validate_path(key)?;
        let mut tree = self.lock();
        self.check_open(&tree)?;

        let prefix = child_prefix(key);
        let doomed: Vec<String> = tree
            .nodes
            .keys()
            .filter(|k| k.as_str() == key || k.starts_with(&prefix))
            .cloned()
            .collect();

        for k in doomed {
            if let Some(node) = tree.nodes.remove(&k) {
                self.emit(&k, node.value, ChangeType::Deleted);
            }
        }
        Ok(())
    }

    async fn get_children_keys(&self, key: &str) -> Result<Vec<String>, CoordinationError> {
        validate_path(key)?;
        let tree = self.lock();
        self.check_open(&tree)?;

        let prefix = child_prefix(key);
        let children: BTreeSet<String> = tree
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        Ok(children.into_iter().collect())
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.shared.events.subscribe()
    }
}

fn child_prefix(key: &str) -> String {
    if key == "/" {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

fn validate_path(key: &str) -> Result<(), CoordinationError> {
    let valid = key.starts_with('/')
        && (key == "/" || !key.ends_with('/'))
        && !key.contains("//");
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(key.to_string()))
    }
}
