//! In-process coordination store.
//!
//! A tree of versioned byte values with the same watch semantics as the
//! network store: data watches are one-shot, fire once per session, and are
//! all discarded when a session expires. Used for embedding and tests; the
//! fault-injection helpers (`drop_connections`, `expire_sessions`,
//! `set_refuse_connections`) reproduce the failure modes the mirror must
//! survive.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::store::{
    EventStream, NodeEventKind, SessionState, StoreClient, StoreConnector, StoreError,
    StoreEvent, StoreResult, WatchHandle, ANY_VERSION,
};

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    version: i32,
}

struct SessionSlot {
    events: mpsc::UnboundedSender<StoreEvent>,
    data_watches: HashMap<String, Vec<oneshot::Sender<StoreEvent>>>,
    connected: bool,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<u64, SessionSlot>,
    next_session: u64,
    refuse_connections: bool,
}

impl Tree {
    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    /// Deliver a node event to every session watching `path`, once per session.
    fn fire_data_watches(&mut self, kind: NodeEventKind, path: &str) {
        let event = StoreEvent::Node {
            kind,
            path: path.to_string(),
        };
        for slot in self.sessions.values_mut() {
            if let Some(watchers) = slot.data_watches.remove(path) {
                for watcher in watchers {
                    let _ = watcher.send(event.clone());
                }
                let _ = slot.events.send(event.clone());
            }
        }
    }

    fn slot(&mut self, session_id: u64) -> StoreResult<&mut SessionSlot> {
        match self.sessions.get_mut(&session_id) {
            Some(slot) if slot.connected => Ok(slot),
            _ => Err(StoreError::ConnectionLoss),
        }
    }
}

/// Shared in-memory store. Clones refer to the same tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        // A panic while holding the lock leaves the tree consistent: every
        // mutation is a single map operation.
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or overwrite a node out of band, creating missing parents.
    ///
    /// Overwrites fire `Changed` on watching sessions, like a write from
    /// another store client would.
    pub fn write(&self, path: &str, data: &[u8]) {
        let mut tree = self.lock();
        let overwritten = tree
            .nodes
            .get_mut(path)
            .map(|node| {
                node.data = data.to_vec();
                node.version += 1;
            })
            .is_some();
        if overwritten {
            tree.fire_data_watches(NodeEventKind::Changed, path);
            return;
        }

        let mut parent = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            parent.push('/');
            parent.push_str(segment);
            tree.nodes.entry(parent.clone()).or_insert(Node {
                data: Vec::new(),
                version: 0,
            });
        }
        tree.nodes.insert(
            path.to_string(),
            Node {
                data: data.to_vec(),
                version: 0,
            },
        );
    }

    /// Remove a node and its descendants out of band, firing `Deleted`.
    pub fn remove(&self, path: &str) {
        let mut tree = self.lock();
        let prefix = format!("{}/", path);
        let doomed: Vec<String> = tree
            .nodes
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in doomed {
            tree.nodes.remove(&key);
            tree.fire_data_watches(NodeEventKind::Deleted, &key);
        }
    }

    /// Read a node directly, bypassing sessions.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().nodes.get(path).map(|node| node.data.clone())
    }

    /// All leaf and interior nodes under `root` (exclusive), with their data.
    pub fn dump(&self, root: &str) -> BTreeMap<String, Vec<u8>> {
        let prefix = format!("{}/", root.trim_end_matches('/'));
        self.lock()
            .nodes
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, node)| (key.clone(), node.data.clone()))
            .collect()
    }

    /// Push a raw event to every live session.
    pub fn broadcast(&self, event: StoreEvent) {
        let tree = self.lock();
        for slot in tree.sessions.values() {
            let _ = slot.events.send(event.clone());
        }
    }

    /// Expire every session: all watches are discarded, then the session
    /// reports `Expired` followed by `Connected` on a fresh session.
    pub fn expire_sessions(&self) {
        let mut tree = self.lock();
        for slot in tree.sessions.values_mut() {
            slot.data_watches.clear();
            let _ = slot.events.send(StoreEvent::State(SessionState::Expired));
            let _ = slot.events.send(StoreEvent::State(SessionState::Connected));
        }
    }

    /// Sever every connection. Calls on those clients fail with `ConnectionLoss`.
    pub fn drop_connections(&self) {
        let mut tree = self.lock();
        for slot in tree.sessions.values_mut() {
            slot.connected = false;
            slot.data_watches.clear();
            let _ = slot.events.send(StoreEvent::State(SessionState::Disconnected));
        }
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Number of sessions that have not been closed.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Number of sessions holding a data watch on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|slot| slot.data_watches.get(path).is_some_and(|w| !w.is_empty()))
            .count()
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self, servers: &[String]) -> StoreResult<(Arc<dyn StoreClient>, EventStream)> {
        let mut tree = self.lock();
        if tree.refuse_connections {
            tracing::warn!(servers = ?servers, "Memory store refusing connection");
            return Err(StoreError::ConnectionLoss);
        }

        let (events, stream) = mpsc::unbounded_channel();
        let _ = events.send(StoreEvent::State(SessionState::Connecting));
        let _ = events.send(StoreEvent::State(SessionState::Connected));

        tree.next_session += 1;
        let session_id = tree.next_session;
        tree.sessions.insert(
            session_id,
            SessionSlot {
                events,
                data_watches: HashMap::new(),
                connected: true,
            },
        );

        let client = MemoryConnection {
            store: self.clone(),
            session_id,
            open: AtomicBool::new(true),
        };
        Ok((Arc::new(client), stream))
    }
}

/// One session against a [`MemoryStore`].
struct MemoryConnection {
    store: MemoryStore,
    session_id: u64,
    open: AtomicBool,
}

fn check_version(path: &str, node: &Node, expected: i32) -> StoreResult<()> {
    if expected != ANY_VERSION && expected != node.version {
        return Err(StoreError::BadVersion {
            path: path.to_string(),
            expected,
            actual: node.version,
        });
    }
    Ok(())
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[async_trait]
impl StoreClient for MemoryConnection {
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        tree.nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn get_watch(&self, path: &str) -> StoreResult<(Vec<u8>, WatchHandle)> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        let data = tree
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let (tx, rx) = oneshot::channel();
        tree.slot(self.session_id)?
            .data_watches
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok((data, WatchHandle::new(rx)))
    }

    async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        if !tree.exists(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(tree.children_of(path))
    }

    async fn create(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        if tree.exists(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }
        let parent = parent_of(path);
        if !tree.exists(parent) {
            return Err(StoreError::NotFound(parent.to_string()));
        }
        tree.nodes.insert(
            path.to_string(),
            Node {
                data: data.to_vec(),
                version: 0,
            },
        );
        Ok(())
    }

    async fn set(&self, path: &str, data: &[u8], version: i32) -> StoreResult<()> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        {
            let node = tree
                .nodes
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            check_version(path, node, version)?;
            node.data = data.to_vec();
            node.version += 1;
        }
        tree.fire_data_watches(NodeEventKind::Changed, path);
        Ok(())
    }

    async fn delete(&self, path: &str, version: i32) -> StoreResult<()> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        {
            let node = tree
                .nodes
                .get(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            check_version(path, node, version)?;
        }
        if !tree.children_of(path).is_empty() {
            return Err(StoreError::NotEmpty(path.to_string()));
        }
        tree.nodes.remove(path);
        tree.fire_data_watches(NodeEventKind::Deleted, path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let mut tree = self.store.lock();
        tree.slot(self.session_id)?;
        Ok(tree.exists(path))
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
            && self
                .store
                .lock()
                .sessions
                .get(&self.session_id)
                .is_some_and(|slot| slot.connected)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.store.lock().sessions.remove(&self.session_id);
        }
    }
}
