// ── Insert-once registry ──
//
// Concurrent keyed storage with O(1) lookups and an ordered key snapshot
// published through a `watch` channel. Entries are never replaced or
// removed for the lifetime of the process.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

pub(crate) struct Registry<T: Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Keys in insertion order.
    keys: watch::Sender<Arc<Vec<String>>>,
}

impl<T: Send + Sync + 'static> Registry<T> {
    pub(crate) fn new() -> Self {
        let (keys, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            keys,
        }
    }

    /// Insert a value under a new key. Returns `None` and drops `value` if
    /// the key is already taken.
    pub(crate) fn insert_new(&self, key: &str, value: T) -> Option<Arc<T>> {
        let stored = match self.by_key.entry(key.to_owned()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(value)).value()),
        };
        self.keys
            .send_modify(|keys| Arc::make_mut(keys).push(key.to_owned()));
        Some(stored)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Keys in insertion order (cheap `Arc` clone).
    pub(crate) fn keys(&self) -> Arc<Vec<String>> {
        self.keys.borrow().clone()
    }

    /// All values in insertion order.
    pub(crate) fn values(&self) -> Vec<Arc<T>> {
        self.keys().iter().filter_map(|k| self.get(k)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_once_per_key() {
        let reg = Registry::new();
        assert!(reg.insert_new("a", 1).is_some());
        assert!(reg.insert_new("a", 2).is_none());
        assert_eq!(*reg.get("a").unwrap(), 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn values_keep_insertion_order() {
        let reg = Registry::new();
        for key in ["c", "a", "b"] {
            reg.insert_new(key, key.to_owned());
        }
        let values: Vec<String> = reg.values().iter().map(|v| v.to_string()).collect();
        assert_eq!(values, ["c", "a", "b"]);
        assert!(reg.contains("a"));
        assert!(!reg.contains("z"));
    }
}
