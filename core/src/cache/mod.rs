//! Shared key/value cache
//!
//! A uniform TTL'd K/V surface used by the hot-path reads (subscription
//! lookups, plan listings) and invalidated on writes. A miss is the `None`
//! sentinel, never an error; errors are reserved for a closed cache, an
//! invalid key, and backend faults. Callers on the read path treat any
//! `CacheError` as a miss and fall through to the database.
//!
//! Two implementations ship: [`MemoryCache`], an LRU bounded by
//! `max_memory_items`, and [`RedisCache`], which uses `SCAN` for pattern
//! invalidation so it never blocks the server on `KEYS`.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a cache operation can produce. A plain miss is *not* an error.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Every operation on a closed cache fails with this
    #[error("cache is closed")]
    Closed,

    /// Keys must be non-empty
    #[error("invalid cache key")]
    InvalidKey,

    /// Only `prefix:*` patterns are supported for invalidation
    #[error("invalid cache pattern: {0}")]
    InvalidPattern(String),

    /// Backend fault (network, protocol); read paths treat this as a miss
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(error: ::redis::RedisError) -> Self {
        Self::Backend(error.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Point-in-time operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Live item count (approximate for Redis)
    pub items: u64,
}

/// Uniform cache surface
///
/// Implementations apply their configured key prefix to every operation;
/// callers always pass unprefixed keys. `ttl: None` means the configured
/// default TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` is the miss sentinel.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;
    async fn exists(&self, key: &str) -> CacheResult<bool>;
    /// Values in the same order as `keys`, `None` per miss.
    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>>;
    async fn mset(&self, pairs: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()>;
    /// Remove exactly the keys matching `pattern` (`prefix:*`), returning
    /// how many were dropped.
    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64>;
    async fn ping(&self) -> CacheResult<()>;
    /// Close the cache; all subsequent operations fail with `Closed`.
    async fn close(&self) -> CacheResult<()>;
    fn stats(&self) -> CacheStats;
}

/// Split a `prefix:*` invalidation pattern into its literal prefix.
pub(crate) fn pattern_prefix(pattern: &str) -> CacheResult<&str> {
    match pattern.strip_suffix('*') {
        Some(prefix) if !pattern.is_empty() => Ok(prefix),
        _ => Err(CacheError::InvalidPattern(pattern.to_string())),
    }
}

pub(crate) fn check_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}
