//! Error types for the V Panel core
//!
//! Every fallible operation in the panel returns [`PanelError`], a tagged
//! taxonomy that maps one-to-one onto the HTTP statuses the server surfaces:
//!
//! - `Validation` - 400, an input failed a field rule
//! - `Unauthorized` - 401, bad credentials or a bad token
//! - `Forbidden` - 403, account disabled, expired, or over quota
//! - `NotFound` - 404, unknown token, user, or resource
//! - `Conflict` - 409, duplicate username/email or an order-no race
//! - `RateLimit` - 429, a sliding window was exceeded
//! - `Canceled` - the request-scoped deadline expired mid-operation
//! - `Internal` - 500, upstream or unexpected failure
//!
//! Errors carry a machine-readable `code`, a human message, and optional
//! `details`; [`ErrorBody`] is the JSON shape handed to clients.
//!
//! # Example
//!
//! ```rust
//! use vpanel_core::error::{PanelError, Result};
//!
//! fn lookup(token: &str) -> Result<()> {
//!     if token.is_empty() {
//!         return Err(PanelError::validation("token must not be empty"));
//!     }
//!     Err(PanelError::not_found("subscription"))
//! }
//!
//! let err = lookup("abc").unwrap_err();
//! assert_eq!(err.http_status(), 404);
//! assert_eq!(err.code(), "not_found");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for V Panel core operations
pub type Result<T> = std::result::Result<T, PanelError>;

/// Error types that can occur inside the panel core
#[derive(Error, Debug)]
pub enum PanelError {
    /// An input value failed a field rule
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credentials or token did not authenticate
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed to proceed
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint or status precondition was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// A rate-limit window was exceeded
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// The request-scoped deadline expired before the operation finished
    #[error("operation canceled")]
    Canceled,

    /// Anything unexpected from an upstream collaborator
    #[error("internal error: {0}")]
    Internal(String),
}

/// Wire shape of an error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `"rate_limit"`
    pub code: String,
    /// Human-readable message; opaque for `Internal`
    pub message: String,
    /// Optional structured context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Request correlation id, when the server attached one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl PanelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// `what` names the missing resource, e.g. `"subscription"` or `"user"`
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for this error kind
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimit(_) => "rate_limit",
            Self::Canceled => "canceled",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status the server surfaces for this kind
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimit(_) => 429,
            // Client went away or the deadline fired; nothing was committed.
            Self::Canceled => 499,
            Self::Internal(_) => 500,
        }
    }

    /// Whether a retry with backoff may succeed (transient upstream faults)
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Build the client-facing body. `Internal` messages are replaced with an
    /// opaque string; the original is for logs only.
    #[must_use]
    pub fn to_body(&self, request_id: Option<String>) -> ErrorBody {
        let message = match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code().to_string(),
            message,
            details: None,
            request_id,
        }
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {error}"))
    }
}

impl From<serde_yaml::Error> for PanelError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Internal(format!("YAML error: {error}"))
    }
}

impl From<bcrypt::BcryptError> for PanelError {
    fn from(error: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("password hash error: {error}"))
    }
}

impl From<redis::RedisError> for PanelError {
    fn from(error: redis::RedisError) -> Self {
        Self::Internal(format!("redis error: {error}"))
    }
}

/// Retry a transient operation up to `max_attempts` with exponential backoff.
///
/// Only errors for which [`PanelError::is_transient`] holds are retried;
/// everything else is returned to the caller on first failure.
pub async fn retry_transient<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = std::time::Duration::from_millis(50);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                tracing::warn!(attempt, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
