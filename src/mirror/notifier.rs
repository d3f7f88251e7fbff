//! Change fan-out for the notified namespaces.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::mirror::ChangeEvent;
use crate::observability::metrics;

/// Result of publishing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for this many subscribers.
    Sent(usize),
    /// The namespace had no subscriber; the event was dropped.
    NoSubscriber,
    /// The path is outside every notified namespace.
    NotRouted,
}

struct Namespace {
    root: String,
    /// `root` plus a trailing `/`; membership is a literal prefix match.
    prefix: String,
    tx: broadcast::Sender<ChangeEvent>,
}

/// Publishes change events without ever blocking the publisher.
///
/// Each namespace has a bounded broadcast channel. Events for a namespace
/// nobody subscribes to are dropped. A subscriber more than `capacity`
/// events behind loses the oldest ones and sees the gap as a lag count.
pub struct ChangeNotifier {
    namespaces: Vec<Namespace>,
    dropped: Arc<AtomicU64>,
}

impl ChangeNotifier {
    pub fn new<I, S>(roots: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let namespaces = roots
            .into_iter()
            .map(|root| {
                let root = root.into();
                let (tx, _) = broadcast::channel(capacity.max(1));
                Namespace {
                    prefix: format!("{}/", root.trim_end_matches('/')),
                    root,
                    tx,
                }
            })
            .collect();
        Self {
            namespaces,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to a namespace by its root (`/lds`, `/cds`).
    pub fn subscribe(&self, root: &str) -> Option<ChangeSubscription> {
        self.namespace(root).map(|ns| ChangeSubscription {
            namespace: ns.root.clone(),
            rx: ns.tx.subscribe(),
            dropped: Arc::clone(&self.dropped),
        })
    }

    /// Whether `path` belongs to a notified namespace.
    pub fn covers(&self, path: &str) -> bool {
        self.route(path).is_some()
    }

    pub fn publish(&self, event: ChangeEvent) -> Delivery {
        let Some(ns) = self.route(&event.path) else {
            return Delivery::NotRouted;
        };

        match ns.tx.send(event) {
            Ok(receivers) => {
                metrics::record_notification(&ns.root, true);
                Delivery::Sent(receivers)
            }
            Err(broadcast::error::SendError(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_notification(&ns.root, false);
                tracing::debug!(
                    namespace = %ns.root,
                    path = %event.path,
                    "No subscriber for change event, dropped"
                );
                Delivery::NoSubscriber
            }
        }
    }

    /// Events dropped so far, whether for lack of a subscriber or lag.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn namespace(&self, root: &str) -> Option<&Namespace> {
        let root = root.trim_end_matches('/');
        self.namespaces
            .iter()
            .find(|ns| ns.root.trim_end_matches('/') == root)
    }

    fn route(&self, path: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| path.starts_with(&ns.prefix))
    }
}

/// Receiving side of one namespace.
pub struct ChangeSubscription {
    namespace: String,
    rx: broadcast::Receiver<ChangeEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChangeSubscription {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Next event, skipping over any lag. `None` once the mirror is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.record_lag(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        use broadcast::error::TryRecvError;
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&self, missed: u64) {
        self.dropped.fetch_add(missed, Ordering::Relaxed);
        metrics::record_lagged(&self.namespace, missed);
        tracing::warn!(
            namespace = %self.namespace,
            missed,
            "Change subscriber lagged, oldest events dropped"
        );
    }
}
