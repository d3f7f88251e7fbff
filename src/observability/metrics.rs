//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mirror_store_events_total` (counter): store events by kind
//! - `mirror_cache_entries` (gauge): entries in the cache
//! - `mirror_resyncs_total` (counter): expiry resyncs by outcome
//! - `mirror_notifications_total` (counter): change events by namespace and outcome
//! - `mirror_callback_failures_total` (counter): failed reconcile callbacks by name
//! - `mirror_reconnects_total` (counter): transport re-establishments

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
///
/// The embedding process calls this once at startup, before
/// `ConfigMirror::start`, when `observability.metrics_enabled` is set.
/// Must be called from within a Tokio runtime. A second call fails because
/// the global recorder is already taken.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_event(kind: &'static str) {
    counter!("mirror_store_events_total", "kind" => kind).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("mirror_cache_entries").set(entries as f64);
}

pub fn record_resync(ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!("mirror_resyncs_total", "outcome" => outcome).increment(1);
}

pub fn record_notification(namespace: &str, delivered: bool) {
    let outcome = if delivered { "delivered" } else { "dropped" };
    counter!(
        "mirror_notifications_total",
        "namespace" => namespace.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_lagged(namespace: &str, missed: u64) {
    counter!(
        "mirror_notifications_total",
        "namespace" => namespace.to_string(),
        "outcome" => "lagged"
    )
    .increment(missed);
}

pub fn record_callback_failure(name: &str) {
    counter!("mirror_callback_failures_total", "callback" => name.to_string()).increment(1);
}

pub fn record_reconnect() {
    counter!("mirror_reconnects_total").increment(1);
}
