//! Concurrent group object stores
//!
//! This module implements the keyed object stores backing group
//! deduplication, using DashMap for lock-free concurrent access. The
//! critical operation is [`GroupStore::get_or_create`]: an atomic upsert per
//! key, which is what upholds the at-most-one-object-per-key invariant when
//! two policies referencing the same selector combination are translated
//! concurrently.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A keyed store of group objects with atomic get-or-create semantics
///
/// Handlers for distinct keys may run concurrently; DashMap's entry API
/// serializes access per key, so no outer lock is needed.
#[derive(Debug)]
pub struct GroupStore<T: Clone> {
    objects: DashMap<String, T>,
}

impl<T: Clone> Default for GroupStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> GroupStore<T> {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    /// Get a clone of the object stored under `key`
    pub fn get(&self, key: &str) -> Option<T> {
        self.objects.get(key).map(|entry| entry.clone())
    }

    /// Returns true if an object is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Create the object under `key` if absent, atomically.
    ///
    /// The constructor runs only when the key is vacant. Returns true when
    /// the object was created by this call, false when it already existed.
    pub fn get_or_create(&self, key: &str, make: impl FnOnce() -> T) -> bool {
        match self.objects.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(make());
                true
            }
        }
    }

    /// Insert or replace the object under `key`
    pub fn insert(&self, key: &str, object: T) {
        self.objects.insert(key.to_string(), object);
    }

    /// Remove and return the object under `key`
    pub fn delete(&self, key: &str) -> Option<T> {
        self.objects.remove(key).map(|(_, object)| object)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Snapshot of all stored keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }
}
