use dashmap::DashMap;
use std::{
    future::Future,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Cache entry with its own TTL.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Valid iff `now < created_at + ttl`.
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.created_at + self.ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_removals: AtomicU64,
}

/// Concurrent key-value store with per-entry expiry.
///
/// Expired entries read exactly like absent ones and are dropped lazily on
/// access or by [`TtlCache::cleanup_expired`]. Misses for the same key are
/// computed once: later callers wait on a per-key lock and then read the
/// fresh entry. Unrelated keys never wait on each other.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    inflight: Arc<DashMap<K, Arc<Mutex<()>>>>,
    counters: Arc<Counters>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let entry = CacheEntry::new(value, ttl);
        self.data.insert(key, entry).map(|old| old.value)
    }

    /// Returns the value if present and unexpired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Only remove if no fresher entry replaced it meanwhile.
        if self
            .data
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.counters.expired_removals.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Returns the cached value or runs `compute`, storing its success for `ttl`.
    ///
    /// Errors are returned to the caller and never stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let slot = self.inflight.entry(key.clone()).or_default().clone();
        let _guard = slot.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops expired entries and idle per-key locks; returns entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.data.len());

        // A lock only referenced by the map has no waiter.
        self.inflight.retain(|_, slot| Arc::strong_count(slot) > 1);

        if removed > 0 {
            self.counters
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Removed {} expired cache entries", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired_removals: self.counters.expired_removals.load(Ordering::Relaxed),
            entries: self.data.len(),
        }
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            inflight: self.inflight.clone(),
            counters: self.counters.clone(),
        }
    }
}

/// Basic cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub expired_removals: u64,
    pub entries: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
