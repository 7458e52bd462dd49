//! In-memory LRU cache for rendered tiles.
//!
//! Entries carry an insertion time and expire lazily on read once older
//! than the configured TTL.
//!
//! ## Memory-Based Eviction
//!
//! The cache is bounded by the summed weight (bytes) of its values rather
//! than by entry count. When an insert would exceed the limit, ~5% of the
//! capacity is freed in one batch, oldest entries first.
//!
//! ## Duplicate Computation
//!
//! [`TileCache::get_or_compute`] lets at most one caller compute a missing
//! key. Concurrent callers for the same key wait for that computation and
//! then read its result from the cache. If the computing caller fails or is
//! cancelled, one of the waiters takes over. Failed computations are never
//! cached.

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Memory accounted to a cached value.
pub trait CacheWeight {
    fn weight(&self) -> u64;
}

impl CacheWeight for Bytes {
    fn weight(&self) -> u64 {
        self.len() as u64
    }
}

impl CacheWeight for Vec<u8> {
    fn weight(&self) -> u64 {
        self.len() as u64
    }
}

impl<T: CacheWeight + ?Sized> CacheWeight for Arc<T> {
    fn weight(&self) -> u64 {
        (**self).weight()
    }
}

struct Entry<V> {
    value: V,
    weight: u64,
    inserted_at: Instant,
}

/// Live counters. All fields are atomic for lock-free reads.
#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    coalesced: AtomicU64,
    eviction_runs: AtomicU64,
    size_bytes: AtomicU64,
    entry_count: AtomicU64,
}

/// Point-in-time copy of the cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    /// Callers that waited on another caller's computation.
    pub coalesced: u64,
    pub eviction_runs: u64,
    pub size_bytes: u64,
    pub entry_count: u64,
    pub max_bytes: u64,
    pub ttl_secs: u64,
}

impl CacheStats {
    /// Cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// TTL + LRU cache with per-key computation deduplication.
pub struct TileCache<K, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    inflight: Mutex<HashMap<K, watch::Sender<()>>>,
    max_bytes: u64,
    ttl: Duration,
    counters: Counters,
}

impl<K, V> TileCache<K, V>
where
    K: Hash + Eq + Clone,
    V: CacheWeight + Clone,
{
    /// Create a cache holding at most `max_size_mb` megabytes of values,
    /// each valid for `ttl`.
    ///
    /// # Example
    /// ```
    /// use bytes::Bytes;
    /// use std::time::Duration;
    /// use storage::TileCache;
    ///
    /// let cache: TileCache<String, Bytes> = TileCache::new(256, Duration::from_secs(3600));
    /// cache.insert("12/2200/1500".to_string(), Bytes::from_static(b"png"));
    /// assert!(cache.get(&"12/2200/1500".to_string()).is_some());
    /// ```
    pub fn new(max_size_mb: usize, ttl: Duration) -> Self {
        Self::with_max_bytes((max_size_mb as u64) * 1024 * 1024, ttl)
    }

    pub fn with_max_bytes(max_bytes: u64, ttl: Duration) -> Self {
        Self {
            // Bounded by weight, not by count.
            entries: Mutex::new(LruCache::unbounded()),
            inflight: Mutex::new(HashMap::new()),
            max_bytes,
            ttl,
            counters: Counters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any. Expired entries are dropped here.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key);
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => return Some(entry.value.clone()),
            Some(_) => true,
        };
        if expired {
            if let Some(entry) = entries.pop(key) {
                self.forget(entry.weight, 1);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }

    /// Store `value`, replacing any previous entry for `key`.
    ///
    /// Values heavier than the whole cache are not stored.
    pub fn insert(&self, key: K, value: V) {
        let weight = value.weight();
        if weight > self.max_bytes {
            debug!(weight, max_bytes = self.max_bytes, "value larger than cache, not stored");
            return;
        }

        let mut entries = self.entries.lock();
        if let Some(old) = entries.pop(&key) {
            self.forget(old.weight, 1);
        }
        if self.counters.size_bytes.load(Ordering::Relaxed) + weight > self.max_bytes {
            self.evict_batch_locked(&mut entries, weight);
        }

        entries.put(
            key,
            Entry {
                value,
                weight,
                inserted_at: Instant::now(),
            },
        );
        self.counters.size_bytes.fetch_add(weight, Ordering::Relaxed);
        self.counters.entry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &K) -> bool {
        match self.entries.lock().pop(key) {
            Some(entry) => {
                self.forget(entry.weight, 1);
                true
            }
            None => false,
        }
    }

    /// Drop all entries. Counters other than size are kept.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.counters.size_bytes.store(0, Ordering::Relaxed);
        self.counters.entry_count.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.counters.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.counters.size_bytes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            eviction_runs: c.eviction_runs.load(Ordering::Relaxed),
            size_bytes: c.size_bytes.load(Ordering::Relaxed),
            entry_count: c.entry_count.load(Ordering::Relaxed),
            max_bytes: self.max_bytes,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Cached value for `key`, or the result of `compute` stored under it.
    ///
    /// Only one `compute` runs per key at a time across all callers.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let guard = loop {
            match self.claim(&key) {
                Claim::Leader(guard) => break guard,
                Claim::Follower(mut rx) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    // Resolves when the leader finishes, fails or is dropped.
                    let _ = rx.changed().await;
                    if let Some(value) = self.lookup(&key) {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(value);
                    }
                }
            }
        };

        // A previous leader may have finished between our miss and the claim.
        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        let result = compute().await;
        if let Ok(value) = &result {
            self.insert(key, value.clone());
        }
        drop(guard);
        result
    }

    fn claim(&self, key: &K) -> Claim<'_, K> {
        let mut inflight = self.inflight.lock();
        if let Some(tx) = inflight.get(key) {
            return Claim::Follower(tx.subscribe());
        }
        let (tx, _) = watch::channel(());
        inflight.insert(key.clone(), tx);
        Claim::Leader(InflightGuard {
            inflight: &self.inflight,
            key: Some(key.clone()),
        })
    }

    fn forget(&self, bytes: u64, count: u64) {
        self.counters.size_bytes.fetch_sub(bytes, Ordering::Relaxed);
        self.counters.entry_count.fetch_sub(count, Ordering::Relaxed);
    }

    /// Evict least-recently-used entries until ~5% of capacity is free and
    /// `incoming` bytes fit. Runs with the entry lock held.
    fn evict_batch_locked(&self, entries: &mut LruCache<K, Entry<V>>, incoming: u64) {
        let target_free = (self.max_bytes / 20).max(1);
        let mut bytes_freed = 0u64;
        let mut evicted = 0u64;

        while bytes_freed < target_free
            || self.counters.size_bytes.load(Ordering::Relaxed) + incoming > self.max_bytes
        {
            let Some((_, entry)) = entries.pop_lru() else { break };
            bytes_freed += entry.weight;
            evicted += 1;
            self.forget(entry.weight, 1);
        }

        self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
        self.counters.eviction_runs.fetch_add(1, Ordering::Relaxed);

        info!(
            entries_evicted = evicted,
            bytes_freed_mb = format!("{:.2}", bytes_freed as f64 / (1024.0 * 1024.0)),
            max_size_mb = format!("{:.2}", self.max_bytes as f64 / (1024.0 * 1024.0)),
            "Tile cache batch eviction completed"
        );
    }
}

enum Claim<'a, K: Hash + Eq> {
    Leader(InflightGuard<'a, K>),
    Follower(watch::Receiver<()>),
}

/// Removes the in-flight marker on drop, which closes the channel and wakes
/// every waiter, whether the computation finished or was cancelled.
struct InflightGuard<'a, K: Hash + Eq> {
    inflight: &'a Mutex<HashMap<K, watch::Sender<()>>>,
    key: Option<K>,
}

impl<K: Hash + Eq> Drop for InflightGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inflight.lock().remove(&key);
        }
    }
}
