//! Coordination session with single-shot re-establishment.
//!
//! # Responsibilities
//! - Connect and block until the store reports `Connected`
//! - Merge every connection's events into one ordered stream
//! - Apply connect and per-call timeouts
//! - Re-establish once when a call fails and no connection is held
//! - Report `Expired` after re-establishing, since the old watches are gone

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::StoreConfig;
use crate::observability::metrics;
use crate::store::{
    EventStream, SessionState, StoreClient, StoreConnector, StoreError, StoreEvent, StoreResult,
    WatchHandle,
};

/// One established connection and the task forwarding its events.
struct Connection {
    client: Arc<dyn StoreClient>,
    generation: u64,
    forwarder: JoinHandle<()>,
}

impl Connection {
    fn teardown(&self) {
        self.client.close();
        self.forwarder.abort();
    }
}

struct SessionInner {
    connector: Arc<dyn StoreConnector>,
    config: StoreConfig,
    current: ArcSwapOption<Connection>,
    /// Serializes re-establishment so concurrent failures reconnect once.
    reconnect: Mutex<()>,
    events_tx: mpsc::UnboundedSender<StoreEvent>,
    state_tx: Arc<watch::Sender<SessionState>>,
    generation: AtomicU64,
    closed: AtomicBool,
}

/// Handle to the coordination store. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("servers", &self.inner.config.servers)
            .field("generation", &self.generation())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Connect to the store, waiting until it reports `Connected`.
    ///
    /// Returns the session and the merged event stream, which stays the same
    /// across reconnects.
    pub async fn connect(
        connector: Arc<dyn StoreConnector>,
        config: StoreConfig,
    ) -> StoreResult<(Self, EventStream)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Connecting);

        let session = Self {
            inner: Arc::new(SessionInner {
                connector,
                config,
                current: ArcSwapOption::empty(),
                reconnect: Mutex::new(()),
                events_tx,
                state_tx: Arc::new(state_tx),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        };

        let connection = session.establish().await?;
        session.inner.current.store(Some(connection));
        Ok((session, events_rx))
    }

    /// Latest session state seen on the event stream.
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Number of connections established so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.call("get", path, |client| async move { client.get(path).await })
            .await
    }

    /// Read a node and arm a one-shot watch on it.
    pub async fn get_watch(&self, path: &str) -> StoreResult<(Vec<u8>, WatchHandle)> {
        self.call("get_watch", path, |client| async move {
            client.get_watch(path).await
        })
        .await
    }

    pub async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        self.call("children", path, |client| async move {
            client.children(path).await
        })
        .await
    }

    pub async fn create(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        self.call("create", path, |client| async move {
            client.create(path, data).await
        })
        .await
    }

    /// Overwrite a node. `version` of [`crate::store::ANY_VERSION`] skips the check.
    pub async fn set(&self, path: &str, data: &[u8], version: i32) -> StoreResult<()> {
        self.call("set", path, |client| async move {
            client.set(path, data, version).await
        })
        .await
    }

    pub async fn delete(&self, path: &str, version: i32) -> StoreResult<()> {
        self.call("delete", path, |client| async move {
            client.delete(path, version).await
        })
        .await
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.call("exists", path, |client| async move {
            client.exists(path).await
        })
        .await
    }

    /// Tear the connection down. Later calls fail with [`StoreError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(connection) = self.inner.current.swap(None) {
            connection.teardown();
        }
        self.inner.state_tx.send_replace(SessionState::Disconnected);
        tracing::info!(servers = ?self.inner.config.servers, "Store session closed");
    }

    async fn call<T, F, Fut>(&self, op: &'static str, path: &str, f: F) -> StoreResult<T>
    where
        F: Fn(Arc<dyn StoreClient>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let connection = match self.inner.current.load_full() {
            Some(connection) => connection,
            None => self.reestablish(None).await?,
        };

        match self.timed(f(connection.client.clone())).await {
            Err(err) if err.is_transport() && !connection.client.is_connected() => {
                tracing::warn!(
                    op,
                    path,
                    error = %err,
                    "Store call failed without a live connection, re-establishing session"
                );
                let connection = self.reestablish(Some(connection.generation)).await?;
                self.timed(f(connection.client.clone())).await
            }
            result => result,
        }
    }

    async fn timed<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let limit = self.inner.config.call_timeout();
        timeout(limit, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(limit)))
    }

    /// Replace the current connection, unless another task already did.
    async fn reestablish(&self, stale: Option<u64>) -> StoreResult<Arc<Connection>> {
        let _guard = self.inner.reconnect.lock().await;

        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        if let Some(current) = self.inner.current.load_full() {
            if stale != Some(current.generation) {
                return Ok(current);
            }
        }

        if let Some(old) = self.inner.current.swap(None) {
            tracing::info!(generation = old.generation, "Tearing down store connection");
            old.teardown();
        }

        let connection = self.establish().await?;
        self.inner.current.store(Some(connection.clone()));
        metrics::record_reconnect();

        // A new connection carries none of the old watches.
        let _ = self
            .inner
            .events_tx
            .send(StoreEvent::State(SessionState::Expired));
        Ok(connection)
    }

    async fn establish(&self) -> StoreResult<Arc<Connection>> {
        let inner = &self.inner;
        let connect_timeout = inner.config.connect_timeout();

        inner.state_tx.send_replace(SessionState::Connecting);
        let mut state_rx = inner.state_tx.subscribe();

        let (client, stream) = timeout(connect_timeout, inner.connector.connect(&inner.config.servers))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let forwarder = tokio::spawn(forward_events(
            generation,
            stream,
            inner.events_tx.clone(),
            inner.state_tx.clone(),
        ));
        let connection = Arc::new(Connection {
            client,
            generation,
            forwarder,
        });

        let connected = timeout(
            connect_timeout,
            state_rx.wait_for(|state| *state == SessionState::Connected),
        )
        .await
        .map(|result| result.is_ok());

        match connected {
            Ok(true) => {
                tracing::info!(
                    servers = ?inner.config.servers,
                    generation,
                    "Store session connected"
                );
                Ok(connection)
            }
            Ok(false) => {
                connection.teardown();
                Err(StoreError::Closed)
            }
            Err(_) => {
                tracing::error!(
                    servers = ?inner.config.servers,
                    timeout = ?connect_timeout,
                    "Store never reported a connected state"
                );
                connection.teardown();
                Err(StoreError::Timeout(connect_timeout))
            }
        }
    }
}

/// Copy one connection's events into the session stream, tracking state.
async fn forward_events(
    generation: u64,
    mut stream: EventStream,
    events_tx: mpsc::UnboundedSender<StoreEvent>,
    state_tx: Arc<watch::Sender<SessionState>>,
) {
    while let Some(event) = stream.recv().await {
        if let StoreEvent::State(state) = &event {
            tracing::info!(generation, state = ?state, "Store session state changed");
            state_tx.send_replace(*state);
        }
        // No dispatch loop attached is fine; state tracking still matters.
        let _ = events_tx.send(event);
    }
    tracing::debug!(generation, "Store event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ANY_VERSION};

    fn store_config() -> StoreConfig {
        StoreConfig {
            servers: vec!["memory:2181".to_string()],
            connect_timeout_ms: 500,
            call_timeout_ms: 500,
        }
    }

    #[tokio::test]
    async fn test_connect_waits_for_connected() {
        let store = MemoryStore::new();
        let (session, mut events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.generation(), 1);
        assert_eq!(
            events.recv().await,
            Some(StoreEvent::State(SessionState::Connecting))
        );
        assert_eq!(
            events.recv().await,
            Some(StoreEvent::State(SessionState::Connected))
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let store = MemoryStore::new();
        store.set_refuse_connections(true);

        let err = Session::connect(Arc::new(store), store_config())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ConnectionLoss);
    }

    #[tokio::test]
    async fn test_reestablishes_once_after_connection_loss() {
        let store = MemoryStore::new();
        store.write("/config/app", b"v1");
        let (session, _events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        store.drop_connections();

        let value = session.get("/config/app").await.unwrap();
        assert_eq!(value, b"v1");
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn test_reestablish_reports_lost_watches() {
        let store = MemoryStore::new();
        store.write("/config/app", b"v1");
        let (session, mut events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        store.drop_connections();
        session.get("/config/app").await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let mut saw_expired = false;
        while let Ok(event) = events.try_recv() {
            if event == StoreEvent::State(SessionState::Expired) {
                saw_expired = true;
            }
        }
        assert!(saw_expired);
    }

    #[tokio::test]
    async fn test_second_failure_is_surfaced() {
        let store = MemoryStore::new();
        let (session, _events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        store.drop_connections();
        store.set_refuse_connections(true);

        let err = session.get("/config/app").await.unwrap_err();
        assert_eq!(err, StoreError::ConnectionLoss);
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn test_request_errors_do_not_reconnect() {
        let store = MemoryStore::new();
        let (session, _events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        let err = session.set("/missing", b"x", ANY_VERSION).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("/missing".into()));
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let store = MemoryStore::new();
        let (session, _events) = Session::connect(Arc::new(store.clone()), store_config())
            .await
            .unwrap();

        session.close();
        assert_eq!(session.exists("/").await.unwrap_err(), StoreError::Closed);
        assert_eq!(store.session_count(), 0);
    }
}
