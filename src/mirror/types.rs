//! Shared mirror types and errors.

use thiserror::Error;

use crate::config::ValidationError;
use crate::store::StoreError;

/// Lifecycle of a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Initial walk in progress.
    Initializing,
    /// Dispatch loop running.
    Ready,
    /// Session expired; roots are being re-walked.
    Resyncing,
    /// A resync walk failed. The dispatch loop has stopped.
    Failed,
    Closed,
}

/// Push notification that a path's value changed.
///
/// Carries no payload: read the path from the mirror to get a value at
/// least as new as the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub path: String,
}

impl ChangeEvent {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Per-path watch bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// A data watch is armed.
    Watching,
    /// The watch fired and has not been re-armed yet.
    RearmPending,
}

/// Errors surfaced by the mirror.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("invalid configuration: {}", join(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error("failed to connect to store: {0}")]
    Connect(#[source] StoreError),

    #[error("failed to walk '{root}': {source}")]
    Walk {
        root: String,
        #[source]
        source: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown notification namespace '{0}'")]
    UnknownNamespace(String),

    #[error("background task failed: {0}")]
    Task(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type MirrorResult<T> = Result<T, MirrorError>;
