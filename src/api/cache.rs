// src/api/cache.rs
//! Bounded in-memory cache with per-entry TTL.
//!
//! Entries are evicted oldest-inserted first once the table is full; reads never
//! refresh an entry's TTL.

use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Memoized result of a governed call
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    Success(Value),
    Failure(String),
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    // insertion sequence -> key; first entry is the oldest surviving insert
    order: BTreeMap<u64, String>,
    next_seq: u64,
    stats: CacheStats,
}

impl<V> CacheInner<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

/// Insertion-order bounded TTL cache
#[derive(Debug)]
pub struct ExpiringCache<V> {
    max_entries: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.lock();

        // overwrite counts as a fresh insert
        let replaced = inner.remove(&key).is_some();
        if !replaced && inner.entries.len() >= self.max_entries {
            if let Some((_, oldest)) = inner.order.pop_first() {
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
                debug!("Cache full, evicted oldest key: {}", oldest);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                seq,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                debug!("Cache MISS for key: {}", key);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            debug!("Cache entry expired for key: {}", key);
            return None;
        }

        inner.stats.hits += 1;
        debug!("Cache HIT for key: {}", key);
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Remove every entry whose key matches. Returns the number removed.
    pub fn remove_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut inner = self.lock();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Stored entries, including ones that have expired but were not read yet
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
