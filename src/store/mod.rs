//! Coordination store subsystem.
//!
//! # Data Flow
//! ```text
//! StoreConnector::connect(servers)
//!     → (StoreClient, per-connection event stream)
//!     → session.rs forwards every connection's events into one stream
//!     → mirror dispatch loop consumes that stream serially
//!
//! Store call from any task:
//!     session.rs → current StoreClient (with per-call timeout)
//!     → transport failure with no live connection?
//!         → tear down, reconnect once, retry once
//! ```
//!
//! # Design Decisions
//! - The network client is a trait seam; `memory.rs` is the in-process backend
//! - Watches are one-shot: a fired watch must be re-armed with `get_watch`
//! - `Expired` invalidates all watches; consumers re-walk, never re-register

pub mod memory;
pub mod session;
pub mod types;

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use memory::MemoryStore;
pub use session::Session;
pub use types::{
    NodeEventKind, SessionState, StoreError, StoreEvent, StoreResult, WatchHandle, ANY_VERSION,
};

/// Ordered stream of session and node events for one connection.
pub type EventStream = mpsc::UnboundedReceiver<StoreEvent>;

/// A live connection to the coordination store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Read a node and register a one-shot data watch on it.
    async fn get_watch(&self, path: &str) -> StoreResult<(Vec<u8>, WatchHandle)>;

    async fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    async fn create(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    async fn set(&self, path: &str, data: &[u8], version: i32) -> StoreResult<()>;

    async fn delete(&self, path: &str, version: i32) -> StoreResult<()>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Whether the client currently holds a usable connection.
    fn is_connected(&self) -> bool;

    /// Release the connection. The event stream ends afterwards.
    fn close(&self);
}

/// Factory for store connections.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, servers: &[String]) -> StoreResult<(Arc<dyn StoreClient>, EventStream)>;
}
