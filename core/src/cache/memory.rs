//! In-process LRU cache with per-entry TTL

use super::{check_key, pattern_prefix, Cache, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` means the entry never expires
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// LRU-bounded in-memory cache
///
/// Expired entries are dropped lazily on access and during pattern
/// invalidation; the LRU bound keeps the footprint fixed regardless.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    prefix: String,
    default_ttl: Duration,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryCache {
    /// `max_items` of 0 falls back to a single slot.
    #[must_use]
    pub fn new(prefix: impl Into<String>, max_items: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_items).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            prefix: prefix.into(),
            default_ttl,
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    fn check_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<Instant> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        }
    }

    fn get_one(&self, key: &str) -> CacheResult<Option<String>> {
        check_key(key)?;
        let full = self.full_key(key);
        let now = Instant::now();
        let mut entries = self.lock();
        let value = entries
            .get(&full)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            // Absent or expired; drop any stale entry lazily.
            entries.pop(&full);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    fn set_one(&self, key: &str, value: &str, expires_at: Option<Instant>) -> CacheResult<()> {
        check_key(key)?;
        self.lock().put(
            self.full_key(key),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_open()?;
        self.get_one(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.check_open()?;
        self.set_one(key, value, self.expiry(ttl))
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_open()?;
        check_key(key)?;
        let existed = self.lock().pop(&self.full_key(key)).is_some();
        if existed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check_open()?;
        check_key(key)?;
        let full = self.full_key(key);
        let now = Instant::now();
        let mut entries = self.lock();
        let live = entries
            .peek(&full)
            .is_some_and(|entry| !entry.is_expired(now));
        if !live {
            entries.pop(&full);
        }
        Ok(live)
    }

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        self.check_open()?;
        keys.iter().map(|key| self.get_one(key)).collect()
    }

    async fn mset(&self, pairs: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()> {
        self.check_open()?;
        let expires_at = self.expiry(ttl);
        for (key, value) in pairs {
            self.set_one(key, value, expires_at)?;
        }
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check_open()?;
        let prefix = self.full_key(pattern_prefix(pattern)?);
        let mut entries = self.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        let mut dropped = 0;
        for key in doomed {
            if entries.pop(&key).is_some() {
                dropped += 1;
            }
        }
        self.deletes.fetch_add(dropped, Ordering::Relaxed);
        Ok(dropped)
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_open()
    }

    async fn close(&self) -> CacheResult<()> {
        self.closed.store(true, Ordering::Release);
        self.lock().clear();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            items: self.lock().len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::new("test", 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_round_trip_and_delete() {
        let cache = cache();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());

        assert!(cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = cache();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_default_ttl_means_no_expiry() {
        let cache = MemoryCache::new("test", 10, Duration::ZERO);
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_pattern_invalidation_is_exact() {
        let cache = cache();
        cache.set("plan:1", "a", None).await.unwrap();
        cache.set("plan:2", "b", None).await.unwrap();
        cache.set("user:1", "c", None).await.unwrap();

        let dropped = cache.invalidate_pattern("plan:*").await.unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(cache.get("plan:1").await.unwrap(), None);
        assert_eq!(cache.get("plan:2").await.unwrap(), None);
        // Non-matching keys survive
        assert_eq!(cache.get("user:1").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let cache = cache();
        cache
            .mset(&[("a", "1"), ("c", "3")], None)
            .await
            .unwrap();
        let values = cache.mget(&["a", "b", "c"]).await.unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_closed_cache_rejects_everything() {
        let cache = cache();
        cache.set("k", "v", None).await.unwrap();
        cache.close().await.unwrap();

        assert!(matches!(cache.get("k").await, Err(CacheError::Closed)));
        assert!(matches!(
            cache.set("k", "v", None).await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(cache.ping().await, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let cache = cache();
        assert!(matches!(
            cache.get("").await,
            Err(CacheError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_lru_bound_evicts() {
        let cache = MemoryCache::new("test", 2, Duration::from_secs(60));
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();
        cache.set("c", "3", None).await.unwrap();
        // "a" was least recently used
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let cache = cache();
        cache.set("k", "v", None).await.unwrap();
        let _ = cache.get("k").await.unwrap();
        let _ = cache.get("missing").await.unwrap();
        cache.delete("k").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.items, 0);
    }
}
