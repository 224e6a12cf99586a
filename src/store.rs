// ABOUTME: Key-value store abstraction for in-memory protocol state
// ABOUTME: Sharded DashMap implementation with atomic per-key operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Protocol State Store
//!
//! Clients, authorization codes, tokens, certificates, connections and replay
//! records all live behind [`Store`]. Components receive an `Arc<dyn Store<K, V>>`
//! so that a durable backend can replace [`MemoryStore`] without touching the
//! protocol logic.
//!
//! Every mutation that must be atomic with respect to other writers of the
//! same key (`insert_if_absent`, `remove_if`, `update`) is a single store call.
//! Callers never read-then-write across two calls when a race would matter.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Concurrency-safe key-value store
pub trait Store<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Snapshot of the value stored under `key`
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace, returning the previous value
    fn insert(&self, key: K, value: V) -> Option<V>;

    /// Insert only when the key is vacant. Returns `true` when inserted.
    fn insert_if_absent(&self, key: K, value: V) -> bool;

    /// Remove unconditionally
    fn remove(&self, key: &K) -> Option<V>;

    /// Remove only when `predicate` holds for the current value
    fn remove_if(&self, key: &K, predicate: &dyn Fn(&V) -> bool) -> Option<V>;

    /// Mutate the value in place. Returns `false` when the key is absent.
    fn update(&self, key: &K, apply: &mut dyn FnMut(&mut V)) -> bool;

    /// Keep only entries for which `keep` returns `true`; returns how many were removed
    fn retain(&self, keep: &dyn Fn(&K, &V) -> bool) -> usize;

    /// Snapshot of all values
    fn values(&self) -> Vec<V>;

    /// Number of entries
    fn len(&self) -> usize;

    /// Whether the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared store handle
pub type SharedStore<K, V> = Arc<dyn Store<K, V>>;

/// In-memory store backed by a sharded `DashMap`
pub struct MemoryStore<K, V> {
    entries: DashMap<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Create an empty store behind a shared trait-object handle
    #[must_use]
    pub fn shared() -> SharedStore<K, V> {
        Arc::new(Self::new())
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                true
            }
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    fn remove_if(&self, key: &K, predicate: &dyn Fn(&V) -> bool) -> Option<V> {
        self.entries
            .remove_if(key, |_, value| predicate(value))
            .map(|(_, value)| value)
    }

    fn update(&self, key: &K, apply: &mut dyn FnMut(&mut V)) -> bool {
        self.entries
            .get_mut(key)
            .map(|mut entry| apply(entry.value_mut()))
            .is_some()
    }

    fn retain(&self, keep: &dyn Fn(&K, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, value| keep(key, value));
        before.saturating_sub(self.entries.len())
    }

    fn values(&self) -> Vec<V> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
