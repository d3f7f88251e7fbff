//! The mirror handle.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{validate_config, MirrorConfig, MirrorSettings};
use crate::lifecycle::Shutdown;
use crate::mirror::{
    CallbackError, CallbackRegistry, ChangeNotifier, ChangeSubscription, ConfigCache,
    Dispatcher, MirrorError, MirrorResult, MirrorState, Reconciler, TreeWalker, WatchState,
    WatchTable,
};
use crate::model::{BackendSet, DecodedValue, Decoder};
use crate::store::{Session, StoreConnector, StoreError, ANY_VERSION};

/// A running mirror of the configured store roots.
///
/// Created by [`ConfigMirror::start`]; background tasks stop on
/// [`ConfigMirror::close`] or when the handle is dropped.
pub struct ConfigMirror {
    session: Session,
    settings: MirrorSettings,
    decoder: Decoder,
    walker: TreeWalker,
    cache: ConfigCache,
    watches: WatchTable,
    notifier: Arc<ChangeNotifier>,
    registry: Arc<CallbackRegistry>,
    state: Arc<watch::Sender<MirrorState>>,
    shutdown: Shutdown,
    dispatch: Mutex<Option<JoinHandle<MirrorResult<()>>>>,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConfigMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMirror")
            .field("roots", &self.settings.roots)
            .field("state", &self.state())
            .field("entries", &self.cache.len())
            .finish()
    }
}

impl ConfigMirror {
    /// Connect, walk every root, then start the dispatch loop and the
    /// reconciler. Any failure before the loop starts is returned.
    pub async fn start(
        connector: Arc<dyn StoreConnector>,
        config: &MirrorConfig,
    ) -> MirrorResult<Self> {
        validate_config(config).map_err(MirrorError::InvalidConfig)?;
        let settings = config.mirror.clone();

        let (session, events) = Session::connect(connector, config.store.clone())
            .await
            .map_err(MirrorError::Connect)?;

        let (state, _) = watch::channel(MirrorState::Initializing);
        let state = Arc::new(state);
        let decoder = Decoder::from_settings(&settings);
        let walker = TreeWalker::new(session.clone(), &settings.roots);
        let cache = ConfigCache::new();
        let watches: WatchTable = Arc::new(DashMap::new());
        let notifier = Arc::new(ChangeNotifier::new(
            [settings.listener_root.clone(), settings.backend_root.clone()],
            settings.notify_capacity,
        ));

        let dispatcher = Dispatcher {
            session: session.clone(),
            walker: walker.clone(),
            decoder: decoder.clone(),
            roots: settings.roots.clone(),
            cache: cache.clone(),
            watches: Arc::clone(&watches),
            notifier: Arc::clone(&notifier),
            state: Arc::clone(&state),
        };

        if let Err(e) = dispatcher.populate().await {
            tracing::error!(error = %e, "Initial mirror walk failed");
            session.close();
            return Err(e);
        }
        state.send_replace(MirrorState::Ready);

        let shutdown = Shutdown::new();
        let registry = Arc::new(CallbackRegistry::new());
        let dispatch = tokio::spawn(dispatcher.run(events, shutdown.subscribe()));
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            session.clone(),
            settings.reconcile_interval(),
        );
        let reconcile = tokio::spawn(reconciler.run(shutdown.subscribe()));

        tracing::info!(
            roots = ?settings.roots,
            entries = cache.len(),
            "Config mirror ready"
        );

        Ok(Self {
            session,
            settings,
            decoder,
            walker,
            cache,
            watches,
            notifier,
            registry,
            state,
            shutdown,
            dispatch: Mutex::new(Some(dispatch)),
            reconcile: Mutex::new(Some(reconcile)),
        })
    }

    /// Value at `path`.
    ///
    /// An uncached path inside a mirrored root is read once from the store
    /// (arming a watch) and cached. A delete processed while that read was in
    /// flight wins: the value read is returned but not cached. Paths outside
    /// every root, missing nodes and failed reads yield `None`.
    pub async fn get(&self, path: &str) -> Option<Arc<DecodedValue>> {
        if let Some(value) = self.cache.get(path) {
            return Some(value);
        }
        if !self.in_namespace(path) {
            return None;
        }

        let generation = self.cache.generation(path);
        match self.session.get_watch(path).await {
            Ok((data, _watch)) => {
                let value = self.decoder.decode(path, &data);
                // The dispatch loop may have stored a newer value meanwhile,
                // or dropped the path after a delete overtook this read.
                match self.cache.store_if_absent(path, value.clone(), generation) {
                    Some(cached) => {
                        self.watches
                            .entry(path.to_string())
                            .or_insert(WatchState::Watching);
                        tracing::debug!(path = %path, "Fetched uncached path");
                        Some(cached)
                    }
                    None => {
                        tracing::debug!(path = %path, "Path deleted during fetch, not cached");
                        Some(Arc::new(value))
                    }
                }
            }
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Fetch-through read failed");
                None
            }
        }
    }

    /// Cached value only; never touches the store.
    pub fn cached(&self, path: &str) -> Option<Arc<DecodedValue>> {
        self.cache.get(path)
    }

    /// Opaque value at `path` as a string.
    pub async fn get_str(&self, path: &str) -> Option<String> {
        self.get(path)
            .await
            .and_then(|value| value.as_str().map(str::to_string))
    }

    /// Backend set at `path`, if the path holds one.
    pub async fn get_backend_set(&self, path: &str) -> Option<BackendSet> {
        self.get(path)
            .await
            .and_then(|value| value.as_backend_set().cloned())
    }

    /// Every cached entry under `prefix` as text.
    pub fn snapshot(&self, prefix: &str) -> BTreeMap<String, String> {
        self.cache.snapshot(prefix)
    }

    /// Fresh read of every backend set under the backend root, keyed by name.
    pub async fn backend_sets(&self) -> MirrorResult<BTreeMap<String, BackendSet>> {
        let root = &self.settings.backend_root;
        self.walker
            .load_backend_sets(root, &self.decoder)
            .await
            .map_err(|source| MirrorError::Walk {
                root: root.clone(),
                source,
            })
    }

    pub async fn create(&self, path: &str, value: &str) -> MirrorResult<()> {
        Ok(self.session.create(path, value.as_bytes()).await?)
    }

    pub async fn create_json<T: Serialize>(&self, path: &str, value: &T) -> MirrorResult<()> {
        let data = serde_json::to_vec(value)?;
        Ok(self.session.create(path, &data).await?)
    }

    /// Overwrite `path`. The cache follows when the change event arrives.
    pub async fn set(&self, path: &str, value: &str) -> MirrorResult<()> {
        Ok(self.session.set(path, value.as_bytes(), ANY_VERSION).await?)
    }

    pub async fn set_json<T: Serialize>(&self, path: &str, value: &T) -> MirrorResult<()> {
        let data = serde_json::to_vec(value)?;
        Ok(self.session.set(path, &data, ANY_VERSION).await?)
    }

    pub async fn delete(&self, path: &str) -> MirrorResult<()> {
        Ok(self.session.delete(path, ANY_VERSION).await?)
    }

    pub async fn exists(&self, path: &str) -> MirrorResult<bool> {
        Ok(self.session.exists(path).await?)
    }

    pub async fn children(&self, path: &str) -> MirrorResult<Vec<String>> {
        Ok(self.session.children(path).await?)
    }

    /// Subscribe to changes under a notified root (`/lds` or `/cds`).
    pub fn subscribe(&self, namespace: &str) -> MirrorResult<ChangeSubscription> {
        self.notifier
            .subscribe(namespace)
            .ok_or_else(|| MirrorError::UnknownNamespace(namespace.to_string()))
    }

    pub fn subscribe_listeners(&self) -> MirrorResult<ChangeSubscription> {
        self.subscribe(&self.settings.listener_root)
    }

    pub fn subscribe_backends(&self) -> MirrorResult<ChangeSubscription> {
        self.subscribe(&self.settings.backend_root)
    }

    /// Add a callback to the reconciliation sweep.
    pub fn register<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        self.registry.register(name, callback);
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn watch_state(&self, path: &str) -> Option<WatchState> {
        self.watches.get(path).map(|state| *state)
    }

    /// Change events dropped by the notifier.
    pub fn notifications_dropped(&self) -> u64 {
        self.notifier.dropped()
    }

    pub fn state(&self) -> MirrorState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<MirrorState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &MirrorSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Wait for the dispatch loop to stop on its own, returning its error.
    pub async fn join(&self) -> MirrorResult<()> {
        let handle = self.lock_dispatch().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| MirrorError::Task(e.to_string()))?,
            None => Ok(()),
        }
    }

    /// Stop background tasks and the session.
    ///
    /// Returns the dispatch loop's error if it had failed.
    pub async fn close(&self) -> MirrorResult<()> {
        self.shutdown.trigger();

        let result = self.join().await;

        let reconcile = self
            .reconcile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = reconcile {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Reconciler task ended abnormally");
            }
        }

        self.session.close();
        self.state.send_replace(MirrorState::Closed);
        tracing::info!("Config mirror closed");
        result
    }

    fn in_namespace(&self, path: &str) -> bool {
        self.settings
            .roots
            .iter()
            .any(|root| path.starts_with(root.as_str()))
    }

    fn lock_dispatch(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<MirrorResult<()>>>> {
        self.dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ConfigMirror {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.session.close();
    }
}
