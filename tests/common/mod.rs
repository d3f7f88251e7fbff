//! Shared utilities for mirror integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use config_mirror::config::{MirrorConfig, StoreConfig};
use config_mirror::{ConfigMirror, MemoryStore};

/// Store with every default root present and some content under each.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.write("/config/feature", b"on");
    store.write("/config/region", b"eu-west");
    store.write("/lds/api", listener_json("svc-a").as_bytes());
    store.write("/cds/orders", ORDERS_BACKEND.as_bytes());
    store.write("/connection/redis", b"10.1.0.5:6379");
    store.write("/service", b"");
    store
}

pub const ORDERS_BACKEND: &str = r#"{
    "Name": "orders",
    "Endpoints": [
        {"Ip": "10.0.0.1", "Port": 8080},
        {"Ip": "10.0.0.2", "Port": 8080}
    ]
}"#;

/// A listener set with one route to `cluster`.
pub fn listener_json(cluster: &str) -> String {
    format!(
        r#"{{"Name":"api","Listeners":[{{"Routes":[{{"Prefix":"/","ClusterName":"{}"}}]}}]}}"#,
        cluster
    )
}

pub fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.store = StoreConfig {
        servers: vec!["memory:2181".to_string()],
        connect_timeout_ms: 1_000,
        call_timeout_ms: 1_000,
    };
    config
}

pub async fn start(store: &MemoryStore) -> ConfigMirror {
    ConfigMirror::start(Arc::new(store.clone()), &test_config())
        .await
        .expect("mirror should start")
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Cached opaque value, without fetch-through.
pub fn cached_str(mirror: &ConfigMirror, path: &str) -> Option<String> {
    mirror
        .cached(path)
        .and_then(|value| value.as_str().map(str::to_string))
}

/// Cluster name of the first route of the cached listener set at `path`.
pub fn cached_cluster(mirror: &ConfigMirror, path: &str) -> Option<String> {
    let value = mirror.cached(path)?;
    let set = value.as_listener_set()?;
    let cluster = set.routes().next().map(|rule| rule.cluster_name.clone());
    cluster
}
