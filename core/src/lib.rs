//! V Panel core - services behind the proxy management panel
//!
//! This crate is the domain core of V Panel: it issues and serves proxy
//! subscriptions in every major client format, guards them with the
//! authentication primitives (bcrypt + JWT, TOTP, rate limiting, token
//! revocation), and runs the commerce machinery (plans, coupons, orders,
//! balances, referral commissions, trials) behind the purchase flow.
//!
//! The HTTP surface lives in the `vpanel-server` binary; persistence is
//! abstracted behind the [`store`] traits with in-memory implementations
//! shipped for single-node deployments and tests.
//!
//! # Example
//!
//! ```rust
//! use vpanel_core::subscription::detect_client_format;
//! use vpanel_core::subscription::ClientFormat;
//!
//! assert_eq!(detect_client_format("Clash.Meta/v1.16.0"), ClientFormat::ClashMeta);
//! assert_eq!(detect_client_format("curl/8.0"), ClientFormat::V2rayN);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth;
pub mod cache;
pub mod commerce;
pub mod config;
pub mod error;
pub mod models;
pub mod notifier;
pub mod store;
pub mod subscription;
pub mod tokens;

// Re-export commonly used items
pub use auth::{AuthService, Claims, LoginOutcome, PortalAuth, RateLimiter, TokenBlacklist};
pub use cache::{Cache, CacheError, CacheStats, MemoryCache, RedisCache};
pub use commerce::{
    BalanceService, CommissionService, CouponService, CreateOrderRequest, OrderService,
    PlanService, TrialService,
};
pub use config::{CacheBackend, PanelConfig};
pub use error::{ErrorBody, PanelError, Result};
pub use notifier::{Notifier, NotifyEvent, TracingNotifier};
pub use subscription::{
    detect::detect_client_format, ClientFormat, Credential, FetchOutcome, FetchQuery,
    SubscriptionService, UserInfo, PROFILE_UPDATE_INTERVAL_HOURS,
};
