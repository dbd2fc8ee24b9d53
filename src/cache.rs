//! Provider Cache (C2): a per-key TTL cache with hit/miss/store/expire
//! counters, replacing per-provider ad hoc `Option<(DateTime, T)>` fields.
//! Bounded by `max_entries` with LRU-by-timestamp eviction, and applies
//! randomized pre-fetch jitter so every provider skips a synchronized wave
//! of requests right after process start.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

/// Default bound on live entries per `TtlCache`; the providers in this
/// crate each key their cache by a single constant provider id, so this
/// is headroom rather than a tight fit.
pub const DEFAULT_MAX_ENTRIES: usize = 128;

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub expires: u64,
}

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

/// A TTL cache keyed by `String`, with a per-key lock so concurrent
/// `get_or_fetch` calls for different keys never block each other and
/// concurrent calls for the *same* key never fetch twice.
pub struct TtlCache<T: Clone + Send + Sync + 'static> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<CacheStats>,
    max_entries: usize,
    fetched_before: Mutex<HashSet<String>>,
}

impl<T: Clone + Send + Sync + 'static> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            max_entries: max_entries.max(1),
            fetched_before: Mutex::new(HashSet::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_accessed = now;
                let value = entry.value.clone();
                drop(entries);
                self.stats.lock().await.hits += 1;
                Some(value)
            }
            Some(_) => {
                drop(entries);
                self.stats.lock().await.expires += 1;
                None
            }
            None => {
                drop(entries);
                self.stats.lock().await.misses += 1;
                None
            }
        }
    }

    pub async fn set(&self, key: String, value: T, ttl: Duration) {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_default();
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.last_accessed).map(|(k, _)| k.clone()) {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, Entry { value, expires_at, last_accessed: now });
        drop(entries);
        self.stats.lock().await.stores += 1;
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        *self.stats.lock().await
    }

    pub async fn reset_stats(&self) {
        *self.stats.lock().await = CacheStats::default();
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sleeps a random duration in `[0, max_delay)` before a fetch, unless
    /// this is the first time `key` has ever been fetched through this
    /// cache instance — skipping the delay on the first call guarantees
    /// startup doesn't pay jitter before anything has data at all.
    async fn jitter_before_fetch(&self, key: &str, max_delay: Duration) {
        let is_first_call = self.fetched_before.lock().await.insert(key.to_string());
        if is_first_call || max_delay.is_zero() {
            return;
        }
        let bound_ms = (max_delay.as_millis() as u64).max(1);
        let sleep_ms = rand::thread_rng().gen_range(0..bound_ms);
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
    }

    /// Gets a fresh value if present, else calls `fetch` to produce and
    /// store one, holding a per-key lock so concurrent callers for the
    /// same key collapse into a single fetch. Opportunistically sweeps
    /// expired entries first and applies pre-fetch jitter on cache misses
    /// after the first one.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, max_delay: Duration, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.cleanup_expired().await;
        if let Some(v) = self.get(key).await {
            return Ok(v);
        }
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        if let Some(v) = self.get(key).await {
            return Ok(v);
        }
        self.jitter_before_fetch(key, max_delay).await;
        let value = fetch().await?;
        self.set(key.to_string(), value.clone(), ttl).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_after_set() {
        let cache: TtlCache<i32> = TtlCache::new();
        assert!(cache.get("a").await.is_none());
        cache.set("a".into(), 42, Duration::from_secs(60)).await;
        assert_eq!(cache.get("a").await, Some(42));
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.stores, 1);
    }

    #[tokio::test]
    async fn expired_entry_counts_as_expire_not_hit() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("a".into(), 1, Duration::from_millis(0)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.stats().await.expires, 1);
    }

    #[tokio::test]
    async fn get_or_fetch_only_calls_fetch_once_per_key() {
        let cache: TtlCache<i32> = TtlCache::new();
        let calls = Arc::new(Mutex::new(0));
        let r: Result<i32, anyhow::Error> = cache
            .get_or_fetch("k", Duration::from_secs(60), Duration::ZERO, || {
                let calls = calls.clone();
                async move {
                    *calls.lock().await += 1;
                    Ok(7)
                }
            })
            .await;
        assert_eq!(r.unwrap(), 7);
        let r2: Result<i32, anyhow::Error> = cache
            .get_or_fetch("k", Duration::from_secs(60), Duration::ZERO, || {
                let calls = calls.clone();
                async move {
                    *calls.lock().await += 1;
                    Ok(99)
                }
            })
            .await;
        assert_eq!(r2.unwrap(), 7);
        assert_eq!(*calls.lock().await, 1);
    }

    #[tokio::test]
    async fn set_beyond_max_entries_evicts_the_least_recently_accessed() {
        let cache: TtlCache<i32> = TtlCache::with_max_entries(2);
        cache.set("a".into(), 1, Duration::from_secs(60)).await;
        cache.set("b".into(), 2, Duration::from_secs(60)).await;
        // touch "a" so "b" becomes the least recently accessed
        assert_eq!(cache.get("a").await, Some(1));
        cache.set("c".into(), 3, Duration::from_secs(60)).await;
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn jitter_is_skipped_on_first_fetch_for_a_key() {
        let cache: TtlCache<i32> = TtlCache::new();
        let start = tokio::time::Instant::now();
        let r: Result<i32, anyhow::Error> = cache
            .get_or_fetch("k", Duration::from_secs(60), Duration::from_secs(3600), || async { Ok(1) })
            .await;
        assert_eq!(r.unwrap(), 1);
        // first fetch for "k" must not sleep, regardless of max_delay
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
