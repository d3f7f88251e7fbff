//! Round-robin endpoint selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{EndpointSelector, SelectError};
use crate::model::{BackendSet, Endpoint};

/// Round-robin selector.
///
/// One cursor is shared by every backend set passed to the same selector,
/// so interleaving services perturbs each other's rotation. A cursor past
/// the end of a shorter list restarts at its first endpoint.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl EndpointSelector for RoundRobin {
    fn next(&self, set: &BackendSet) -> Result<Endpoint, SelectError> {
        let len = set.endpoints.len();
        if len == 0 {
            return Err(SelectError::NoEndpoints(set.name.clone()));
        }

        // The closure always returns Some, so fetch_update cannot fail.
        let previous = match self.cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            let cur = if cur >= len { 0 } else { cur };
            Some((cur + 1) % len)
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        let index = if previous >= len { 0 } else { previous };

        Ok(set.endpoints[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_set(name: &str, ips: &[&str]) -> BackendSet {
        BackendSet {
            name: name.into(),
            endpoints: ips
                .iter()
                .map(|ip| Endpoint {
                    ip: ip.to_string(),
                    port: 8080,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let set = backend_set("orders", &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);

        let picked: Vec<String> = (0..4).map(|_| lb.next(&set).unwrap().ip).collect();
        assert_eq!(picked, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[test]
    fn test_empty_set_leaves_cursor() {
        let lb = RoundRobin::new();
        let set = backend_set("orders", &["10.0.0.1", "10.0.0.2"]);
        lb.next(&set).unwrap();

        let empty = backend_set("empty", &[]);
        assert_eq!(
            lb.next(&empty),
            Err(SelectError::NoEndpoints("empty".into()))
        );
        assert_eq!(lb.position(), 1);
        assert_eq!(lb.next(&set).unwrap().ip, "10.0.0.2");
    }

    #[test]
    fn test_cursor_shared_across_sets() {
        let lb = RoundRobin::new();
        let big = backend_set("big", &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let small = backend_set("small", &["10.1.0.1", "10.1.0.2"]);

        assert_eq!(lb.next(&big).unwrap().ip, "10.0.0.1");
        assert_eq!(lb.next(&big).unwrap().ip, "10.0.0.2");
        assert_eq!(lb.next(&big).unwrap().ip, "10.0.0.3");
        // Cursor wrapped to 0 for `big`.
        assert_eq!(lb.next(&small).unwrap().ip, "10.1.0.1");
        assert_eq!(lb.next(&big).unwrap().ip, "10.0.0.2");
        // Cursor is 2, past the end of `small`: clamps to its first endpoint.
        assert_eq!(lb.next(&small).unwrap().ip, "10.1.0.1");
        assert_eq!(lb.position(), 1);
    }

    #[test]
    fn test_concurrent_selection_is_balanced() {
        use std::sync::Arc;

        let lb = Arc::new(RoundRobin::new());
        let set = Arc::new(backend_set("orders", &["a", "b", "c", "d"]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = Arc::clone(&lb);
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    (0..100).map(|_| lb.next(&set).unwrap().ip).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for ip in handle.join().unwrap() {
                *counts.entry(ip).or_insert(0) += 1;
            }
        }
        assert!(counts.values().all(|&n| n == 100));
    }
}
