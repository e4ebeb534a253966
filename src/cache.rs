//! Bounded LRU cache shared by the bin index and the key/value caches.

use std::collections::HashMap;
use std::hash::Hash;

/// Bounded cache with strict least-recently-used eviction.
///
/// Lookups are O(1) amortized; a hit refreshes the entry's recency.
/// Eviction happens synchronously on insert and drops the evicted value.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    map: HashMap<K, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_used: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            map: HashMap::new(),
        }
    }

    /// Looks up an entry, refreshing its recency on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        self.map.get_mut(key).map(|entry| {
            entry.last_used = tick;
            &entry.value
        })
    }

    /// Inserts an entry, evicting the least-recently-used one when full.
    /// Returns the evicted pair, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self.map.get_mut(&key) {
            entry.value = value;
            entry.last_used = tick;
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        self.map.insert(key, Entry { value, last_used: tick });
        evicted
    }

    fn evict(&mut self) -> Option<(K, V)> {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone())?;
        self.map
            .remove(&oldest)
            .map(|entry| (oldest, entry.value))
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
