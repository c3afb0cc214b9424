//! Redis-backed cache
//!
//! Pattern invalidation walks the keyspace with `SCAN MATCH` in cursor
//! steps, never `KEYS`, so a large keyspace cannot stall the server.

use super::{check_key, pattern_prefix, Cache, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Cache backed by a shared Redis instance
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
    default_ttl: Duration,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
            default_ttl,
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
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

    fn ttl_secs(&self, ttl: Option<Duration>) -> u64 {
        ttl.unwrap_or(self.default_ttl).as_secs()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_open()?;
        check_key(key)?;
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.check_open()?;
        check_key(key)?;
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        let secs = self.ttl_secs(ttl);
        if secs == 0 {
            let _: () = conn.set(full, value).await?;
        } else {
            let _: () = conn.set_ex(full, value, secs).await?;
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check_open()?;
        check_key(key)?;
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(self.full_key(key)).await?;
        if removed > 0 {
            self.deletes.fetch_add(removed, Ordering::Relaxed);
        }
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check_open()?;
        check_key(key)?;
        let mut conn = self.conn.clone();
        Ok(conn.exists(self.full_key(key)).await?)
    }

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        self.check_open()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        for key in keys {
            check_key(key)?;
        }
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = if full.len() == 1 {
            // MGET with one key still answers with an array, but the crate
            // decodes a single-element command as a scalar.
            vec![conn.get(&full[0]).await?]
        } else {
            conn.mget(&full).await?
        };
        for value in &values {
            if value.is_some() {
                self.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(values)
    }

    async fn mset(&self, pairs: &[(&str, &str)], ttl: Option<Duration>) -> CacheResult<()> {
        self.check_open()?;
        if pairs.is_empty() {
            return Ok(());
        }
        for (key, _) in pairs {
            check_key(key)?;
        }
        let secs = self.ttl_secs(ttl);
        let mut pipe = redis::pipe();
        for (key, value) in pairs {
            let full = self.full_key(key);
            if secs == 0 {
                pipe.set(full, *value).ignore();
            } else {
                pipe.set_ex(full, *value, secs).ignore();
            }
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        self.sets.fetch_add(pairs.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check_open()?;
        let prefix = pattern_prefix(pattern)?;
        let match_pattern = format!("{}*", self.full_key(prefix));
        let mut conn = self.conn.clone();
        let mut doomed: Vec<String> = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&match_pattern).await?;
            while let Some(key) = iter.next_item().await {
                doomed.push(key);
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(doomed).await?;
        self.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_open()?;
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            // Redis owns the keyspace; a per-prefix count would need a scan.
            items: 0,
        }
    }
}
