//! Guarded shared-state stores.
//!
//! The registries are plain mutex-guarded maps behind a scoped-access API:
//! callers get the inner map only inside a closure, so a lookup can never
//! outlive the guard that made it safe. Accessors that need two registries
//! live on `WorldServer` and acquire them in the fixed order (players before
//! chunks; items always last).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// A mutex-guarded map exposing scoped access only.
pub struct GuardedMap<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> Default for GuardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> GuardedMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` with exclusive access to the map.
    pub fn with<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard)
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.with(|map| map.insert(key, value))
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.with(|map| map.remove(key))
    }

    pub fn len(&self) -> usize {
        self.with(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.with(|map| map.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn scoped_access_roundtrip() {
        let map: GuardedMap<i32, String> = GuardedMap::new();
        map.insert(1, "one".into());
        let found = map.with(|m| m.get(&1).cloned());
        assert_eq!(found.as_deref(), Some("one"));
        assert!(map.contains_key(&1));
        assert_eq!(map.remove(&1).as_deref(), Some("one"));
        assert!(map.is_empty());
    }

    #[test]
    fn concurrent_inserts_are_serialized() {
        let map: Arc<GuardedMap<i32, i32>> = Arc::new(GuardedMap::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.insert(t * 100 + i, i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 800);
    }
}
