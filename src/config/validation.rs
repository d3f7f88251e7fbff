//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that notified roots are absolute paths
//! - Validate value ranges (timeouts > 0, capacity > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MirrorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::MirrorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("store.servers must not be empty")]
    NoServers,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("mirror.roots must not be empty")]
    NoRoots,

    #[error("{field} must be an absolute path, got {value:?}")]
    RelativePath { field: &'static str, value: String },

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &MirrorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }
    if config.store.connect_timeout_ms == 0 {
        errors.push(ValidationError::Zero("store.connect_timeout_ms"));
    }
    if config.store.call_timeout_ms == 0 {
        errors.push(ValidationError::Zero("store.call_timeout_ms"));
    }

    let mirror = &config.mirror;
    if mirror.roots.is_empty() {
        errors.push(ValidationError::NoRoots);
    }
    // "/" is a valid root: it walks the top level, filtered by the other
    // roots, or by the default namespaces when it stands alone.
    for root in mirror.roots.iter().filter(|root| !root.starts_with('/')) {
        errors.push(ValidationError::RelativePath {
            field: "mirror.roots",
            value: root.clone(),
        });
    }
    check_absolute("mirror.listener_root", &mirror.listener_root, &mut errors);
    check_absolute("mirror.backend_root", &mirror.backend_root, &mut errors);
    check_absolute("mirror.connection_root", &mirror.connection_root, &mut errors);

    if mirror.reconcile_interval_secs == 0 {
        errors.push(ValidationError::Zero("mirror.reconcile_interval_secs"));
    }
    if mirror.notify_capacity == 0 {
        errors.push(ValidationError::Zero("mirror.notify_capacity"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_absolute(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.len() < 2 || !value.starts_with('/') {
        errors.push(ValidationError::RelativePath {
            field,
            value: value.to_string(),
        });
    }
}
