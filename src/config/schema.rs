//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mirror.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the config mirror.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MirrorConfig {
    /// Coordination store connection settings.
    pub store: StoreConfig,

    /// Mirrored namespaces and background task settings.
    pub mirror: MirrorSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Coordination store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store ensemble addresses (e.g., "zk01:2181").
    pub servers: Vec<String>,

    /// Time allowed to reach the connected state, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed for a single store call, in milliseconds.
    pub call_timeout_ms: u64,
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                "zk01:2181".to_string(),
                "zk02:2181".to_string(),
                "zk03:2181".to_string(),
            ],
            connect_timeout_ms: 10_000,
            call_timeout_ms: 5_000,
        }
    }
}

/// Namespaces mirrored from the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Top-level roots walked at startup and on resync.
    /// Accepts a list or a comma-separated string; a missing leading `/` is added.
    #[serde(deserialize_with = "root_list")]
    pub roots: Vec<String>,

    /// Root holding listener sets (decoded and notified).
    pub listener_root: String,

    /// Root holding backend sets (decoded and notified).
    pub backend_root: String,

    /// Root holding plain connection parameters.
    pub connection_root: String,

    /// Seconds between reconciliation sweeps.
    pub reconcile_interval_secs: u64,

    /// Per-namespace buffer of undelivered change events.
    pub notify_capacity: usize,
}

impl MirrorSettings {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            roots: parse_root_list(DEFAULT_ROOTS),
            listener_root: "/lds".to_string(),
            backend_root: "/cds".to_string(),
            connection_root: "/connection".to_string(),
            reconcile_interval_secs: 30,
            notify_capacity: 64,
        }
    }
}

/// Roots mirrored when none are configured.
pub const DEFAULT_ROOTS: &str = "config,lds,cds,connection,service";

/// Split a comma-separated root list, prefixing each entry with `/`.
pub fn parse_root_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|root| !root.is_empty())
        .map(normalize_root)
        .collect()
}

fn normalize_root(root: &str) -> String {
    if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{}", root)
    }
}

fn root_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Roots {
        Csv(String),
        List(Vec<String>),
    }

    Ok(match Roots::deserialize(deserializer)? {
        Roots::Csv(list) => parse_root_list(&list),
        Roots::List(roots) => roots.iter().map(|r| normalize_root(r.trim())).collect(),
    })
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roots() {
        let settings = MirrorSettings::default();
        assert_eq!(
            settings.roots,
            vec!["/config", "/lds", "/cds", "/connection", "/service"]
        );
        assert_eq!(settings.reconcile_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_roots_from_csv_or_list() {
        let config: MirrorConfig = toml::from_str(
            r#"
            [mirror]
            roots = "lds, /cds"
            "#,
        )
        .unwrap();
        assert_eq!(config.mirror.roots, vec!["/lds", "/cds"]);

        let config: MirrorConfig = toml::from_str(
            r#"
            [mirror]
            roots = ["config", "/service"]
            "#,
        )
        .unwrap();
        assert_eq!(config.mirror.roots, vec!["/config", "/service"]);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: MirrorConfig = toml::from_str(
            r#"
            [store]
            servers = ["10.0.0.9:2181"]
            "#,
        )
        .unwrap();
        assert_eq!(config.store.servers, vec!["10.0.0.9:2181"]);
        assert_eq!(config.store.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.mirror.backend_root, "/cds");
    }
}
