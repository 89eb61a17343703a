use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

/// Values that can report logical emptiness, enabling
/// [`SafeMap::delete_if_empty`] garbage collection.
pub trait Emptiable {
    fn is_empty(&self) -> bool;
}

impl<T: Emptiable> Emptiable for Arc<T> {
    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
}

/// A read-majority thread-safe map.
///
/// Lookups take the read lock; values are handed out by clone, so `V` is
/// typically an `Arc` or a small copyable record.
pub struct SafeMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> SafeMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        self.inner.write().unwrap().insert(key, value);
    }

    /// Remove and return the value under `key`.
    pub fn pop(&self, key: &K) -> Option<V> {
        self.inner.write().unwrap().remove(key)
    }

    /// Remove and return the value under `key` only if `pred` approves it.
    pub fn pop_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut map = self.inner.write().unwrap();
        if map.get(key).is_some_and(|v| pred(v)) {
            map.remove(key)
        } else {
            None
        }
    }

    pub fn remove(&self, key: &K) {
        self.inner.write().unwrap().remove(key);
    }

    /// Atomic insert-if-absent: returns the resident value if one exists,
    /// otherwise inserts `default` and returns it.
    pub fn get_or_default(&self, key: K, default: V) -> V {
        if let Some(existing) = self.inner.read().unwrap().get(&key) {
            return existing.clone();
        }
        let mut map = self.inner.write().unwrap();
        map.entry(key).or_insert(default).clone()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Emptiable> SafeMap<K, V> {
    /// Remove `key` iff its value currently reports empty.
    /// Returns whether a removal happened.
    pub fn delete_if_empty(&self, key: &K) -> bool {
        let mut map = self.inner.write().unwrap();
        if map.get(key).is_some_and(|v| v.is_empty()) {
            map.remove(key);
            true
        } else {
            false
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for SafeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Emptiable for SafeMap<K, V> {
    fn is_empty(&self) -> bool {
        SafeMap::is_empty(self)
    }
}
