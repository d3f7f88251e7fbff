//! Path-keyed cache of decoded store values.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::model::DecodedValue;
use crate::observability::metrics;

/// A thread-safe cache of mirrored values.
///
/// Only the mirror writes; any number of readers may hold clones. Values are
/// replaced whole, so a reader's `Arc` never changes under it.
///
/// Every removal bumps a per-path generation. A writer that read the store
/// before a removal can tell its value is stale and must not cache it.
#[derive(Debug, Clone, Default)]
pub struct ConfigCache {
    inner: Arc<DashMap<String, Arc<DecodedValue>>>,
    removals: Arc<DashMap<String, u64>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<DecodedValue>> {
        self.inner.get(path).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Cached paths starting with `prefix`, sorted.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .inner
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        paths.sort();
        paths
    }

    /// Text form of every entry under `prefix`. Typed records are re-encoded
    /// as JSON; an entry that fails to encode is skipped and logged.
    pub fn snapshot(&self, prefix: &str) -> BTreeMap<String, String> {
        let mut snapshot = BTreeMap::new();
        for entry in self.inner.iter().filter(|e| e.key().starts_with(prefix)) {
            match entry.value().to_text() {
                Ok(text) => {
                    snapshot.insert(entry.key().clone(), text);
                }
                Err(e) => {
                    tracing::warn!(path = %entry.key(), error = %e, "Skipping unencodable cache entry");
                }
            }
        }
        snapshot
    }

    pub(crate) fn store(&self, path: impl Into<String>, value: DecodedValue) {
        self.inner.insert(path.into(), Arc::new(value));
        metrics::record_cache_size(self.inner.len());
    }

    /// Number of removals seen for `path` so far.
    pub(crate) fn generation(&self, path: &str) -> u64 {
        self.removals.get(path).map(|entry| *entry).unwrap_or(0)
    }

    /// Insert unless a value is already present or `path` was removed since
    /// `generation` was taken.
    ///
    /// Returns the cached value, or `None` when the insert was refused
    /// because of a removal.
    pub(crate) fn store_if_absent(
        &self,
        path: impl Into<String>,
        value: DecodedValue,
        generation: u64,
    ) -> Option<Arc<DecodedValue>> {
        let path = path.into();
        let cached = match self.inner.entry(path) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            // Checked under the shard lock: a racing remove bumps the
            // generation before it takes this lock.
            Entry::Vacant(entry) if self.generation(entry.key()) == generation => {
                Some(Arc::clone(entry.insert(Arc::new(value)).value()))
            }
            Entry::Vacant(_) => None,
        };
        metrics::record_cache_size(self.inner.len());
        cached
    }

    pub(crate) fn remove(&self, path: &str) -> Option<Arc<DecodedValue>> {
        *self.removals.entry(path.to_string()).or_insert(0) += 1;
        let removed = self.inner.remove(path).map(|(_, value)| value);
        metrics::record_cache_size(self.inner.len());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendSet;

    #[test]
    fn test_store_and_replace() {
        let cache = ConfigCache::new();
        cache.store("/config/a", DecodedValue::Opaque("1".into()));
        let first = cache.get("/config/a").unwrap();

        cache.store("/config/a", DecodedValue::Opaque("2".into()));
        assert_eq!(first.as_str(), Some("1"));
        assert_eq!(cache.get("/config/a").unwrap().as_str(), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_if_absent_keeps_existing() {
        let cache = ConfigCache::new();
        cache.store("/config/a", DecodedValue::Opaque("newer".into()));

        let kept = cache
            .store_if_absent("/config/a", DecodedValue::Opaque("older".into()), 0)
            .unwrap();
        assert_eq!(kept.as_str(), Some("newer"));

        let inserted = cache
            .store_if_absent("/config/b", DecodedValue::Opaque("b".into()), 0)
            .unwrap();
        assert_eq!(inserted.as_str(), Some("b"));
    }

    #[test]
    fn test_store_if_absent_refuses_after_removal() {
        let cache = ConfigCache::new();
        let seen = cache.generation("/config/late");

        // Removal of an uncached path still counts.
        assert!(cache.remove("/config/late").is_none());
        assert_eq!(cache.generation("/config/late"), seen + 1);

        let refused = cache.store_if_absent("/config/late", DecodedValue::Opaque("v1".into()), seen);
        assert!(refused.is_none());
        assert!(cache.get("/config/late").is_none());

        let current = cache.generation("/config/late");
        assert!(cache
            .store_if_absent("/config/late", DecodedValue::Opaque("v2".into()), current)
            .is_some());
        assert_eq!(cache.get("/config/late").unwrap().as_str(), Some("v2"));
    }

    #[test]
    fn test_snapshot_encodes_typed_values() {
        let cache = ConfigCache::new();
        cache.store("/config/a", DecodedValue::Opaque("plain".into()));
        cache.store(
            "/cds/orders",
            DecodedValue::Backend(BackendSet {
                name: "orders".into(),
                ..Default::default()
            }),
        );

        let all = cache.snapshot("/");
        assert_eq!(all["/config/a"], "plain");
        assert!(all["/cds/orders"].contains(r#""Name":"orders""#));

        let only_cds = cache.snapshot("/cds");
        assert_eq!(only_cds.len(), 1);
        assert_eq!(cache.paths_under("/c"), vec!["/cds/orders", "/config/a"]);
    }

    #[test]
    fn test_remove() {
        let cache = ConfigCache::new();
        cache.store("/config/a", DecodedValue::Opaque("1".into()));
        assert!(cache.remove("/config/a").is_some());
        assert!(cache.remove("/config/a").is_none());
        assert!(cache.is_empty());
    }
}
