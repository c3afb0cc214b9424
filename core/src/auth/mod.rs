//! Authentication core
//!
//! [`service::AuthService`] is the cryptographic kernel (bcrypt, HS256 JWT,
//! TOTP); [`portal::PortalAuth`] orchestrates the portal flows on top of it
//! together with the [`rate_limit::RateLimiter`] and
//! [`blacklist::TokenBlacklist`].

pub mod blacklist;
pub mod portal;
pub mod rate_limit;
pub mod service;
pub mod validate;

pub use blacklist::TokenBlacklist;
pub use portal::{LoginOutcome, PortalAuth, RegisterRequest, TwoFactorEnrolment};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use service::{AuthService, Claims, TokenKind};
