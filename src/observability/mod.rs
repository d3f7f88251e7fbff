//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! store session, dispatch loop, notifier, reconciler produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, plain or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Library code only emits; the embedding process installs subscribers
//! - Metric calls are no-ops until a recorder is installed
//! - Log fields are structured (`path = %path`), never formatted into text

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
