//! Endpoint selection subsystem.
//!
//! # Data Flow
//! ```text
//! caller needs an upstream for service X
//!     → ConfigMirror::get("/cds/X") → BackendSet
//!     → EndpointSelector::next (round_robin.rs)
//!     → Endpoint (copy) or SelectError::NoEndpoints
//! ```
//!
//! # Design Decisions
//! - Selectors read the backend set they are handed; they never cache it
//! - Endpoint status is not consulted; filtering is the caller's choice
//! - Weights are carried on endpoints but ignored by round robin

pub mod round_robin;

use thiserror::Error;

use crate::model::{BackendSet, Endpoint};

pub use round_robin::RoundRobin;

/// Errors from endpoint selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("no endpoints available for '{0}'")]
    NoEndpoints(String),
}

/// Picks one endpoint from a backend set.
pub trait EndpointSelector: Send + Sync {
    fn next(&self, set: &BackendSet) -> Result<Endpoint, SelectError>;
}
