//! Per-IP sliding window of failed login attempts with lockout
//!
//! State is a read-heavy map guarded by `RwLock`; the check path takes the
//! read lock only. A background sweeper calls [`RateLimiter::cleanup`] to
//! evict entries whose window and lockout have both lapsed.

use crate::error::{PanelError, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Window parameters
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl RateLimitConfig {
    /// Login endpoint: 5 failures per minute, one-minute lockout.
    #[must_use]
    pub const fn login() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
            lockout: Duration::from_secs(60),
        }
    }

    /// Portal-wide variant with the 15-minute window.
    #[must_use]
    pub const fn portal() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
            lockout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    first_attempt: Instant,
    locked_until: Option<Instant>,
}

/// Failed-attempt tracker keyed by client IP
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, Entry>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fails with `RateLimit` while `ip` is locked out or has exhausted its
    /// in-window attempts.
    pub fn check_rate_limit(&self, ip: &str) -> Result<()> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: &str, now: Instant) -> Result<()> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(ip) else {
            return Ok(());
        };
        if entry.locked_until.is_some_and(|until| until > now) {
            return Err(PanelError::rate_limit("too many failed attempts"));
        }
        // A lapsed window counts as a fresh start.
        if now.duration_since(entry.first_attempt) > self.config.window {
            return Ok(());
        }
        if entry.count >= self.config.max_attempts {
            return Err(PanelError::rate_limit("too many failed attempts"));
        }
        Ok(())
    }

    /// Record the outcome of a login attempt. Success clears the IP's
    /// state; an in-window failure increments the count and arms the
    /// lockout once the cap is reached.
    pub fn record_login_attempt(&self, ip: &str, success: bool) {
        self.record_at(ip, success, Instant::now());
    }

    fn record_at(&self, ip: &str, success: bool, now: Instant) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if success {
            entries.remove(ip);
            return;
        }
        let entry = entries.entry(ip.to_string()).or_insert(Entry {
            count: 0,
            first_attempt: now,
            locked_until: None,
        });
        if now.duration_since(entry.first_attempt) > self.config.window {
            // Out of window: start a fresh one with this failure.
            *entry = Entry {
                count: 1,
                first_attempt: now,
                locked_until: None,
            };
            return;
        }
        entry.count += 1;
        if entry.count >= self.config.max_attempts {
            entry.locked_until = Some(now + self.config.lockout);
        }
    }

    /// Drop entries whose window has lapsed and whose lockout has passed.
    /// Returns the number evicted.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| {
            let window_live = now.duration_since(entry.first_attempt) <= self.config.window;
            let locked = entry.locked_until.is_some_and(|until| until > now);
            window_live || locked
        });
        before - entries.len()
    }

    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::login())
    }

    #[test]
    fn test_sixth_attempt_is_limited() {
        let limiter = limiter();
        let t0 = Instant::now();
        for i in 0..5 {
            assert!(limiter.check_at("1.2.3.4", t0).is_ok(), "attempt {i}");
            limiter.record_at("1.2.3.4", false, t0);
        }
        assert!(matches!(
            limiter.check_at("1.2.3.4", t0),
            Err(PanelError::RateLimit(_))
        ));
    }

    #[test]
    fn test_success_resets_counter() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..4 {
            limiter.record_at("1.2.3.4", false, t0);
        }
        limiter.record_at("1.2.3.4", true, t0);
        assert!(limiter.check_at("1.2.3.4", t0).is_ok());
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            limiter.record_at("1.1.1.1", false, t0);
        }
        assert!(limiter.check_at("1.1.1.1", t0).is_err());
        assert!(limiter.check_at("2.2.2.2", t0).is_ok());
    }

    #[test]
    fn test_lockout_expires_after_period() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            limiter.record_at("1.2.3.4", false, t0);
        }
        assert!(limiter.check_at("1.2.3.4", t0).is_err());
        // Just past the lockout: the window has also lapsed, fresh start.
        let later = t0 + Duration::from_secs(61);
        assert!(limiter.check_at("1.2.3.4", later).is_ok());
    }

    #[test]
    fn test_out_of_window_failure_starts_fresh() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            limiter.record_at("1.2.3.4", false, t0);
        }
        let later = t0 + Duration::from_secs(120);
        limiter.record_at("1.2.3.4", false, later);
        // Count restarted at 1, not 4.
        assert!(limiter.check_at("1.2.3.4", later).is_ok());
    }

    #[test]
    fn test_cleanup_evicts_lapsed_entries() {
        let limiter = limiter();
        let t0 = Instant::now();
        limiter.record_at("1.2.3.4", false, t0);
        for _ in 0..5 {
            limiter.record_at("5.6.7.8", false, t0);
        }
        assert_eq!(limiter.cleanup_at(t0), 0);
        // Past window and lockout for both
        let evicted = limiter.cleanup_at(t0 + Duration::from_secs(200));
        assert_eq!(evicted, 2);
        assert_eq!(limiter.tracked_ips(), 0);
    }
}
