//! One-level tree walks with watched reads.

use std::collections::BTreeMap;

use crate::config::DEFAULT_ROOTS;
use crate::model::{BackendSet, Decoder};
use crate::store::{Session, StoreResult};

/// Reads the immediate children of a root, arming a data watch on each.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    session: Session,
    /// Comma-joined root names, used to filter the children of `/`.
    root_names: String,
}

impl TreeWalker {
    pub fn new(session: Session, roots: &[String]) -> Self {
        let names: Vec<&str> = roots
            .iter()
            .map(|root| root.trim_start_matches('/'))
            .filter(|name| !name.is_empty())
            .collect();
        // A bare "/" names nothing itself; filter by the default namespaces.
        let root_names = if names.is_empty() {
            DEFAULT_ROOTS.to_string()
        } else {
            names.join(",")
        };
        Self {
            session,
            root_names,
        }
    }

    /// Watched read of every child of `root`, one level deep.
    ///
    /// A root without children yields nothing. The first failing call aborts
    /// the walk.
    pub async fn walk(&self, root: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let children = self.session.children(root).await?;
        let mut entries = Vec::with_capacity(children.len());

        for child in children {
            // Substring match against the joined list: "/" keeps "lds" and also "ld".
            if root == "/" && !self.root_names.contains(child.as_str()) {
                tracing::trace!(child = %child, "Skipping unmirrored top-level node");
                continue;
            }

            let path = child_path(root, &child);
            // The watch fires through the session event stream; the handle is not needed.
            let (data, _watch) = self.session.get_watch(&path).await?;
            entries.push((path, data));
        }

        tracing::debug!(root = %root, entries = entries.len(), "Walked root");
        Ok(entries)
    }

    /// Walk `root` and decode every child as a backend set, keyed by child name.
    pub async fn load_backend_sets(
        &self,
        root: &str,
        decoder: &Decoder,
    ) -> StoreResult<BTreeMap<String, BackendSet>> {
        let entries = self.walk(root).await?;
        Ok(entries
            .into_iter()
            .map(|(path, data)| {
                let set = decoder.decode_backend_set(&path, &data);
                let name = path.rsplit('/').next().unwrap_or_default().to_string();
                (name, set)
            })
            .collect())
    }
}

/// `root + "/" + child`, without doubling a trailing slash.
pub fn child_path(root: &str, child: &str) -> String {
    if root.ends_with('/') {
        format!("{}{}", root, child)
    } else {
        format!("{}/{}", root, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::Arc;

    async fn walker(store: &MemoryStore, roots: &[&str]) -> TreeWalker {
        let config = StoreConfig {
            servers: vec!["memory:2181".into()],
            connect_timeout_ms: 500,
            call_timeout_ms: 500,
        };
        let (session, _events) = Session::connect(Arc::new(store.clone()), config)
            .await
            .unwrap();
        let roots: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        TreeWalker::new(session, &roots)
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/cds", "orders"), "/cds/orders");
        assert_eq!(child_path("/", "cds"), "/cds");
        assert_eq!(child_path("/cds/", "orders"), "/cds/orders");
    }

    #[tokio::test]
    async fn test_walk_reads_and_watches_children() {
        let store = MemoryStore::new();
        store.write("/config/a", b"1");
        store.write("/config/b", b"2");
        store.write("/config/b/nested", b"deep");
        let walker = walker(&store, &["/config"]).await;

        let entries = walker.walk("/config").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("/config/a".to_string(), b"1".to_vec()),
                ("/config/b".to_string(), b"2".to_vec()),
            ]
        );
        assert_eq!(store.watch_count("/config/a"), 1);
        assert_eq!(store.watch_count("/config/b/nested"), 0);
    }

    #[tokio::test]
    async fn test_walk_empty_and_missing_roots() {
        let store = MemoryStore::new();
        store.write("/service", b"");
        let walker = walker(&store, &["/service", "/absent"]).await;

        assert!(walker.walk("/service").await.unwrap().is_empty());
        assert_eq!(
            walker.walk("/absent").await.unwrap_err(),
            StoreError::NotFound("/absent".into())
        );
    }

    #[tokio::test]
    async fn test_walk_top_level_filters_by_root_names() {
        let store = MemoryStore::new();
        store.write("/lds", b"l");
        store.write("/cds", b"c");
        store.write("/zookeeper", b"z");
        let walker = walker(&store, &["/lds", "/cds"]).await;

        let paths: Vec<String> = walker
            .walk("/")
            .await
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, vec!["/cds", "/lds"]);
    }

    #[tokio::test]
    async fn test_walk_lone_top_level_root_uses_default_namespaces() {
        let store = MemoryStore::new();
        store.write("/config", b"c");
        store.write("/service", b"s");
        store.write("/zookeeper", b"z");
        let walker = walker(&store, &["/"]).await;

        let paths: Vec<String> = walker
            .walk("/")
            .await
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, vec!["/config", "/service"]);
    }

    #[tokio::test]
    async fn test_load_backend_sets() {
        let store = MemoryStore::new();
        store.write("/cds/orders", br#"{"Name":"orders","Endpoints":[{"Ip":"10.0.0.1"}]}"#);
        store.write("/cds/broken", b"nope");
        let walker = walker(&store, &["/cds"]).await;

        let sets = walker
            .load_backend_sets("/cds", &Decoder::default())
            .await
            .unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets["orders"].endpoints[0].ip, "10.0.0.1");
        assert!(sets["broken"].endpoints.is_empty());
    }
}
