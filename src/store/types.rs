//! Store events, watch handles and error definitions.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Version token that skips the optimistic version check on `set`/`delete`.
pub const ANY_VERSION: i32 = -1;

/// Session-level state reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
    /// Every watch registered on the session is gone.
    Expired,
}

/// Per-node notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventKind {
    Changed,
    Deleted,
    ChildrenChanged,
    Created,
}

impl NodeEventKind {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeEventKind::Changed => "changed",
            NodeEventKind::Deleted => "deleted",
            NodeEventKind::ChildrenChanged => "children_changed",
            NodeEventKind::Created => "created",
        }
    }
}

/// One entry of the ordered session event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    State(SessionState),
    Node { kind: NodeEventKind, path: String },
}

impl StoreEvent {
    pub fn changed(path: impl Into<String>) -> Self {
        StoreEvent::Node {
            kind: NodeEventKind::Changed,
            path: path.into(),
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        StoreEvent::Node {
            kind: NodeEventKind::Deleted,
            path: path.into(),
        }
    }

    /// Path of a node event, `None` for state transitions.
    pub fn path(&self) -> Option<&str> {
        match self {
            StoreEvent::Node { path, .. } => Some(path),
            StoreEvent::State(_) => None,
        }
    }
}

/// A one-shot watch registered by `get_watch`.
///
/// Fires at most once. The same notification is also delivered on the
/// session event stream, which is what the mirror consumes; the handle is
/// for callers that want to await a single path directly.
#[derive(Debug)]
pub struct WatchHandle {
    rx: oneshot::Receiver<StoreEvent>,
}

impl WatchHandle {
    pub fn new(rx: oneshot::Receiver<StoreEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the watch to fire.
    ///
    /// Returns `None` when the watch was discarded without firing, which is
    /// what happens to every watch when the session expires.
    pub async fn fired(self) -> Option<StoreEvent> {
        self.rx.await.ok()
    }
}

/// Errors returned by coordination store calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("version mismatch on {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("connection to coordination store lost")]
    ConnectionLoss,

    #[error("coordination store session expired")]
    SessionExpired,

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("session closed")]
    Closed,

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// True for failures of the connection rather than of the request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLoss | StoreError::SessionExpired | StoreError::Timeout(_)
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
