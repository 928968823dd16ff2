// Concurrency-safe value containers
// Shared, cloneable collections suited as replicated object payloads

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer, ser::SerializeMap};

/// A sequence that can be read and appended to from many threads.
///
/// Clones share the same storage; `snapshot` copies the elements out.
#[derive(Debug)]
pub struct ConcurrentList<E> {
    inner: Arc<RwLock<Vec<E>>>,
}

impl<E> Clone for ConcurrentList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for ConcurrentList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ConcurrentList<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn push(&self, element: E) {
        self.inner.write().push(element);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Whether both handles point at the same storage
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: Clone> ConcurrentList<E> {
    pub fn snapshot(&self) -> Vec<E> {
        self.inner.read().clone()
    }

    pub fn get(&self, index: usize) -> Option<E> {
        self.inner.read().get(index).cloned()
    }
}

impl<E: PartialEq> ConcurrentList<E> {
    pub fn contains(&self, element: &E) -> bool {
        self.inner.read().contains(element)
    }
}

impl<E> From<Vec<E>> for ConcurrentList<E> {
    fn from(elements: Vec<E>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(elements)),
        }
    }
}

impl<E> FromIterator<E> for ConcurrentList<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<E: Clone + PartialEq> PartialEq for ConcurrentList<E> {
    fn eq(&self, other: &Self) -> bool {
        if self.shares_storage(other) {
            return true;
        }
        // Never hold both read locks at once
        let mine: Vec<E> = self.inner.read().iter().cloned().collect();
        *other.inner.read() == mine
    }
}

impl<E: Serialize> Serialize for ConcurrentList<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.read().iter())
    }
}

/// A string-keyed map that supports concurrent reads and writes.
///
/// Clones share the same storage.
#[derive(Debug)]
pub struct ConcurrentMap<V> {
    inner: Arc<DashMap<String, V>>,
}

impl<V> Clone for ConcurrentMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Default for ConcurrentMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ConcurrentMap<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<V: Clone> ConcurrentMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|e| e.value().clone())
    }

    pub fn snapshot(&self) -> HashMap<String, V> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for ConcurrentMap<V>
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Clone + PartialEq> PartialEq for ConcurrentMap<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.snapshot() == other.snapshot()
    }
}

impl<V: Serialize> Serialize for ConcurrentMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.inner.len()))?;
        for entry in self.inner.iter() {
            map.serialize_entry(entry.key(), entry.value())?;
        }
        map.end()
    }
}
