//! In-memory table of the most recent mutations not yet flushed.
//!
//! Backed by a concurrent skip list keyed by raw bytes, so lookups and the
//! sorted iteration used by flush are both O(log n) without an outer lock.
//! Deletes install tombstones rather than removing entries; a tombstone must
//! survive until a flush writes it out, where it masks older SSTable values.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

use kura_core::types::{Key, Lookup, Value};

/// Per-entry bookkeeping overhead counted against the flush threshold.
const ENTRY_OVERHEAD: usize = 32;

/// A live value or a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Value(Value),
    Tombstone,
}

impl Entry {
    fn charged_bytes(&self, key: &[u8]) -> usize {
        let value_len = match self {
            Entry::Value(v) => v.len(),
            Entry::Tombstone => 0,
        };
        key.len() + value_len + ENTRY_OVERHEAD
    }
}

/// Ordered map of pending mutations, byte-lexicographic on keys.
pub struct Memtable {
    data: SkipMap<Key, Entry>,
    approx_bytes: AtomicUsize,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            approx_bytes: AtomicUsize::new(0),
        }
    }

    /// Install or replace the mapping for `key`. A prior tombstone becomes a
    /// live value again.
    pub fn put(&self, key: Key, value: Value) {
        self.insert(key, Entry::Value(value));
    }

    /// Install a tombstone for `key`; subsequent reads observe "not found".
    /// Keys never seen before still get a tombstone, so the delete masks any
    /// older SSTable value after the next flush.
    pub fn delete(&self, key: Key) {
        self.insert(key, Entry::Tombstone);
    }

    fn insert(&self, key: Key, entry: Entry) {
        let added = entry.charged_bytes(&key);
        let removed = self
            .data
            .get(&key)
            .map(|e| e.value().charged_bytes(&key))
            .unwrap_or(0);

        self.data.insert(key, entry);

        self.approx_bytes.fetch_add(added, Ordering::Relaxed);
        self.approx_bytes.fetch_sub(removed, Ordering::Relaxed);
    }

    pub fn get(&self, key: &[u8]) -> Lookup {
        match self.data.get(key) {
            Some(entry) => match entry.value() {
                Entry::Value(v) => Lookup::Hit(v.clone()),
                Entry::Tombstone => Lookup::Tombstone,
            },
            None => Lookup::Miss,
        }
    }

    /// Entries in key order; used by flush to stream an SSTable.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (Key, Entry)> + '_ {
        self.data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
    }

    /// Cheap size estimate driving the flush-threshold decision.
    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard all entries.
    pub fn clear(&self) {
        while self.data.pop_front().is_some() {}
        self.approx_bytes.store(0, Ordering::Relaxed);
    }
}
