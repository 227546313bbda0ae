//! Latest-value cache shared by pollers, watchers and the publisher.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

/// Alias-keyed cache of the most recent value computed for each alias.
///
/// Cloning is cheap and every clone refers to the same map. Each read and
/// write takes the lock once, so a reader never observes a half-written
/// value. No history is kept: a write replaces the previous value.
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    values: Arc<RwLock<HashMap<String, f64>>>,
}

impl ValueCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value for `alias`, or `None` if it was never written.
    pub fn get(&self, alias: &str) -> Option<f64> {
        self.values.read().get(alias).copied()
    }

    /// Store `value` for `alias`, returning the value it replaced.
    pub fn set(&self, alias: impl Into<String>, value: f64) -> Option<f64> {
        self.values.write().insert(alias.into(), value)
    }

    /// Whether a value has been stored for `alias`.
    pub fn contains(&self, alias: &str) -> bool {
        self.values.read().contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Sorted copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .read()
            .iter()
            .map(|(alias, value)| (alias.clone(), *value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_is_not_zero() {
        let cache = ValueCache::new();
        assert_eq!(cache.get("flow"), None);
        assert!(!cache.contains("flow"));

        cache.set("flow", 0.0);
        assert_eq!(cache.get("flow"), Some(0.0));
        assert!(cache.contains("flow"));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ValueCache::new();
        assert_eq!(cache.set("flow", 40.0), None);
        assert_eq!(cache.set("flow", 41.5), Some(40.0));
        assert_eq!(cache.get("flow"), Some(41.5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let cache = ValueCache::new();
        let other = cache.clone();

        other.set("return", 45.0);
        assert_eq!(cache.get("return"), Some(45.0));
    }

    #[test]
    fn test_snapshot_sorted() {
        let cache = ValueCache::new();
        cache.set("b", 2.0);
        cache.set("a", 1.0);

        let snapshot: Vec<_> = cache.snapshot().into_iter().collect();
        assert_eq!(
            snapshot,
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)]
        );
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = ValueCache::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..1000 {
                        cache.set(format!("alias{}", i), n as f64);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 8);
        for i in 0..8 {
            assert_eq!(cache.get(&format!("alias{}", i)), Some(999.0));
        }
    }
}
