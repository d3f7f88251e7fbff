//! Periodic maintenance callbacks.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::store::Session;

/// Error type returned by maintenance callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(Session) -> BoxFuture<'static, Result<(), CallbackError>> + Send + Sync>;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub succeeded: usize,
    /// Names of callbacks that returned an error or panicked.
    pub failed: Vec<String>,
}

/// Named callbacks, run in registration order.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Mutex<Vec<(String, Callback)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        let name = name.into();
        let wrapped: Callback = Arc::new(
            move |session: Session| -> BoxFuture<'static, Result<(), CallbackError>> {
                Box::pin(callback(session))
            },
        );
        tracing::debug!(callback = %name, "Reconcile callback registered");
        self.lock().push((name, wrapped));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every callback once. Each runs in its own task so a panic is
    /// contained; failures are logged and the sweep continues.
    pub async fn run_all(&self, session: &Session) -> SweepReport {
        let callbacks = self.lock().clone();
        let mut report = SweepReport::default();

        for (name, callback) in callbacks {
            let outcome = tokio::spawn(callback(session.clone())).await;
            match outcome {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(e)) => {
                    tracing::warn!(callback = %name, error = %e, "Reconcile callback failed");
                    metrics::record_callback_failure(&name);
                    report.failed.push(name);
                }
                Err(e) => {
                    tracing::error!(callback = %name, error = %e, "Reconcile callback panicked");
                    metrics::record_callback_failure(&name);
                    report.failed.push(name);
                }
            }
        }
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Callback)>> {
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Timer driving the registry.
pub struct Reconciler {
    registry: Arc<CallbackRegistry>,
    session: Session,
    period: Duration,
}

impl Reconciler {
    pub fn new(registry: Arc<CallbackRegistry>, session: Session, period: Duration) -> Self {
        Self {
            registry,
            session,
            period,
        }
    }

    /// Sweep every `period` until shutdown. The first sweep happens one
    /// period after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.period, "Reconciler starting");

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Reconciler received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    if self.registry.is_empty() {
                        continue;
                    }
                    let report = self.registry.run_all(&self.session).await;
                    tracing::debug!(
                        succeeded = report.succeeded,
                        failed = report.failed.len(),
                        "Reconcile sweep finished"
                    );
                }
            }
        }
    }
}
