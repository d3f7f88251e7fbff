//! Serial dispatch of store events into the cache.
//!
//! # Responsibilities
//! - Populate the cache from every root (startup and resync)
//! - Re-read and re-arm on `Changed`, drop on `Deleted`
//! - Hand listener and backend changes to the notifier
//! - Resync everything on session expiry

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use crate::mirror::{
    ChangeEvent, ChangeNotifier, ConfigCache, MirrorError, MirrorResult, MirrorState,
    TreeWalker, WatchState,
};
use crate::model::Decoder;
use crate::observability::metrics;
use crate::store::{EventStream, NodeEventKind, Session, SessionState, StoreError, StoreEvent};

/// Per-path watch bookkeeping shared with the mirror handle.
pub type WatchTable = Arc<DashMap<String, WatchState>>;

/// Owns the write side of the cache. Runs as a single task.
pub struct Dispatcher {
    pub(crate) session: Session,
    pub(crate) walker: TreeWalker,
    pub(crate) decoder: Decoder,
    pub(crate) roots: Vec<String>,
    pub(crate) cache: ConfigCache,
    pub(crate) watches: WatchTable,
    pub(crate) notifier: Arc<ChangeNotifier>,
    pub(crate) state: Arc<watch::Sender<MirrorState>>,
}

impl Dispatcher {
    /// Walk every root and overwrite the cache with what is found.
    pub async fn populate(&self) -> MirrorResult<usize> {
        let mut loaded = 0;
        for root in &self.roots {
            let entries = self
                .walker
                .walk(root)
                .await
                .map_err(|source| MirrorError::Walk {
                    root: root.clone(),
                    source,
                })?;

            for (path, data) in entries {
                let value = self.decoder.decode(&path, &data);
                self.cache.store(path.clone(), value);
                self.watches.insert(path, WatchState::Watching);
                loaded += 1;
            }
        }
        tracing::info!(roots = ?self.roots, entries = loaded, "Mirror populated");
        Ok(loaded)
    }

    /// Consume the session's events until shutdown, the stream ending, or a
    /// failed resync.
    pub async fn run(
        self,
        mut events: EventStream,
        mut shutdown: broadcast::Receiver<()>,
    ) -> MirrorResult<()> {
        tracing::info!("Mirror dispatch loop started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Mirror dispatch loop received shutdown signal, exiting loop");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Store event stream closed, exiting dispatch loop");
                        return Ok(());
                    };
                    self.handle(event).await?;
                }
            }
        }
    }

    async fn handle(&self, event: StoreEvent) -> MirrorResult<()> {
        match event {
            StoreEvent::State(SessionState::Expired) => {
                metrics::record_event("expired");
                self.resync().await
            }
            StoreEvent::State(state) => {
                tracing::info!(state = ?state, "Store session state");
                Ok(())
            }
            StoreEvent::Node { kind, path } => {
                metrics::record_event(kind.as_str());
                match kind {
                    NodeEventKind::Changed => self.on_changed(&path).await,
                    NodeEventKind::Deleted => self.on_deleted(&path),
                    NodeEventKind::ChildrenChanged | NodeEventKind::Created => {
                        tracing::debug!(path = %path, kind = kind.as_str(), "Node event ignored");
                    }
                }
                Ok(())
            }
        }
    }

    async fn on_changed(&self, path: &str) {
        self.watches
            .insert(path.to_string(), WatchState::RearmPending);

        match self.session.get_watch(path).await {
            Ok((data, _watch)) => {
                let value = self.decoder.decode(path, &data);
                self.cache.store(path, value);
                self.watches.insert(path.to_string(), WatchState::Watching);
                tracing::debug!(path = %path, "Cache entry updated");

                if self.notifier.covers(path) {
                    self.notifier.publish(ChangeEvent::new(path));
                }
            }
            Err(StoreError::NotFound(_)) => {
                // Deleted between the event and the re-read.
                self.cache.remove(path);
                self.watches.remove(path);
                tracing::debug!(path = %path, "Changed node is gone, removed from cache");
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to re-read changed node, watch not re-armed");
            }
        }
    }

    fn on_deleted(&self, path: &str) {
        self.cache.remove(path);
        self.watches.remove(path);
        tracing::debug!(path = %path, "Cache entry removed");
    }

    async fn resync(&self) -> MirrorResult<()> {
        tracing::warn!("Store session expired, resyncing mirror");
        self.state.send_replace(MirrorState::Resyncing);
        self.watches.clear();

        match self.populate().await {
            Ok(_) => {
                metrics::record_resync(true);
                self.state.send_replace(MirrorState::Ready);
                Ok(())
            }
            Err(e) => {
                metrics::record_resync(false);
                tracing::error!(error = %e, "Mirror resync failed, dispatch loop stopping");
                self.state.send_replace(MirrorState::Failed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::MemoryStore;

    async fn dispatcher(store: &MemoryStore, roots: &[&str]) -> (Dispatcher, EventStream) {
        let config = StoreConfig {
            servers: vec!["memory:2181".into()],
            connect_timeout_ms: 500,
            call_timeout_ms: 500,
        };
        let (session, events) = Session::connect(Arc::new(store.clone()), config)
            .await
            .unwrap();
        let roots: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        let (state, _) = watch::channel(MirrorState::Initializing);
        let dispatcher = Dispatcher {
            walker: TreeWalker::new(session.clone(), &roots),
            session,
            decoder: Decoder::default(),
            roots,
            cache: ConfigCache::new(),
            watches: Arc::new(DashMap::new()),
            notifier: Arc::new(ChangeNotifier::new(["/lds", "/cds"], 8)),
            state: Arc::new(state),
        };
        (dispatcher, events)
    }

    #[tokio::test]
    async fn test_populate_marks_every_path_watching() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        store.write("/cds/orders", br#"{"Name":"orders"}"#);
        let (dispatcher, _events) = dispatcher(&store, &["/config", "/cds"]).await;

        assert_eq!(dispatcher.populate().await.unwrap(), 2);
        assert_eq!(
            dispatcher.cache.get("/cds/orders").unwrap().as_backend_set().unwrap().name,
            "orders"
        );
        assert_eq!(
            dispatcher.watches.get("/config/a").map(|s| *s),
            Some(WatchState::Watching)
        );
    }

    #[tokio::test]
    async fn test_populate_fails_on_missing_root() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        let (dispatcher, _events) = dispatcher(&store, &["/config", "/lds"]).await;

        match dispatcher.populate().await {
            Err(MirrorError::Walk { root, source }) => {
                assert_eq!(root, "/lds");
                assert_eq!(source, StoreError::NotFound("/lds".into()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_changed_updates_and_notifies_only_notified_roots() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        store.write("/lds/api", br#"{"Name":"v1"}"#);
        let (dispatcher, _events) = dispatcher(&store, &["/config", "/lds"]).await;
        dispatcher.populate().await.unwrap();
        let mut listeners = dispatcher.notifier.subscribe("/lds").unwrap();

        store.write("/config/a", b"2");
        store.write("/lds/api", br#"{"Name":"v2"}"#);
        dispatcher.handle(StoreEvent::changed("/config/a")).await.unwrap();
        dispatcher.handle(StoreEvent::changed("/lds/api")).await.unwrap();

        assert_eq!(dispatcher.cache.get("/config/a").unwrap().as_str(), Some("2"));
        assert_eq!(listeners.try_recv(), Some(ChangeEvent::new("/lds/api")));
        assert_eq!(listeners.try_recv(), None);
        assert_eq!(store.watch_count("/lds/api"), 1);
    }

    #[tokio::test]
    async fn test_changed_node_gone_is_forgotten() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        let (dispatcher, _events) = dispatcher(&store, &["/config"]).await;
        dispatcher.populate().await.unwrap();

        store.remove("/config/a");
        dispatcher.handle(StoreEvent::changed("/config/a")).await.unwrap();

        assert!(dispatcher.cache.get("/config/a").is_none());
        assert!(dispatcher.watches.get("/config/a").is_none());
    }

    #[tokio::test]
    async fn test_failed_reread_leaves_rearm_pending() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        let (dispatcher, _events) = dispatcher(&store, &["/config"]).await;
        dispatcher.populate().await.unwrap();

        store.drop_connections();
        store.set_refuse_connections(true);
        dispatcher.handle(StoreEvent::changed("/config/a")).await.unwrap();

        assert_eq!(
            dispatcher.watches.get("/config/a").map(|s| *s),
            Some(WatchState::RearmPending)
        );
        assert_eq!(dispatcher.cache.get("/config/a").unwrap().as_str(), Some("1"));
    }

    #[tokio::test]
    async fn test_resync_failure_is_fatal() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        let (dispatcher, _events) = dispatcher(&store, &["/config"]).await;
        dispatcher.populate().await.unwrap();

        store.remove("/config");
        let result = dispatcher
            .handle(StoreEvent::State(SessionState::Expired))
            .await;

        assert!(matches!(result, Err(MirrorError::Walk { .. })));
        assert_eq!(*dispatcher.state.borrow(), MirrorState::Failed);
    }
}
