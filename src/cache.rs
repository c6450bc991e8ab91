//! In-memory TTL cache.
//!
//! Memoizes album listings to avoid re-enumerating the remote store on
//! every request. Entries expire a fixed duration after insertion and are
//! dropped lazily on read; a periodic sweep bounds memory between reads.
//! Staleness within the TTL is accepted; a miss always degrades to a live
//! recomputation, never to an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe key/value cache with a uniform absolute TTL.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Get a value if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
        }
        // Expired (or already gone). Only remove if still expired, so a
        // concurrent fresh insert is not discarded.
        self.entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= self.ttl);
        None
    }

    /// Insert a value, evicting the oldest entry at capacity.
    pub fn insert(&self, key: String, value: V) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop a single key.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Spawn a background task sweeping expired entries at a fixed interval.
pub fn start_cleanup_task<V: Clone + Send + Sync + 'static>(
    cache: Arc<TtlCache<V>>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            cache.cleanup_expired();
        }
    });
}
