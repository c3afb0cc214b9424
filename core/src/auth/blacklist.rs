//! Revoked-token blacklist
//!
//! Stores SHA-256 digests of revoked opaque tokens together with their
//! natural expiry; a token past its own expiry needs no blacklisting, so
//! `is_revoked` answers true only until then and a sweeper drops stale
//! entries. The in-memory set is authoritative for reads; an optional
//! cache mirror makes revocations visible to sibling processes.

use crate::cache::Cache;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy)]
struct Revocation {
    revoked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Hash-set of revoked tokens with expiry
#[derive(Default)]
pub struct TokenBlacklist {
    entries: RwLock<HashMap<String, Revocation>>,
    mirror: Option<Arc<dyn Cache>>,
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl TokenBlacklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror writes into `cache` for multi-process deployments. Reads stay
    /// on the in-memory set to keep the hot path fast.
    #[must_use]
    pub fn with_mirror(cache: Arc<dyn Cache>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            mirror: Some(cache),
        }
    }

    /// Revoke `token` until its natural expiry.
    pub async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        if expires_at <= now {
            return;
        }
        let key = digest(token);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.clone(),
                Revocation {
                    revoked_at: now,
                    expires_at,
                },
            );
        if let Some(mirror) = &self.mirror {
            let ttl = (expires_at - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            // Best effort; the local set already holds the revocation.
            if let Err(err) = mirror
                .set(&format!("revoked:{key}"), &now.to_rfc3339(), Some(ttl))
                .await
            {
                tracing::warn!(error = %err, "blacklist mirror write failed");
            }
        }
    }

    /// True while the token is revoked and not yet past its own expiry.
    #[must_use]
    pub fn is_revoked(&self, token: &str) -> bool {
        self.is_revoked_at(token, Utc::now())
    }

    fn is_revoked_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&digest(token))
            .is_some_and(|entry| now <= entry.expires_at)
    }

    /// When the token was revoked, if it is currently blacklisted.
    #[must_use]
    pub fn revoked_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&digest(token))
            .map(|entry| entry.revoked_at)
    }

    /// Drop entries whose tokens have expired on their own. Returns the
    /// number evicted.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
