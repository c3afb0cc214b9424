//! Subscription delivery engine
//!
//! Token and short-code issuance, the access gate, proxy filtering, and
//! dispatch into the per-client [`formats`] generators.

pub mod detect;
pub mod formats;
pub mod service;

/// Fixed `Profile-Update-Interval` value, in hours. Every response of the
/// fetch surface advertises this same constant.
pub const PROFILE_UPDATE_INTERVAL_HOURS: u32 = 24;

pub use detect::{detect_client_format, ClientFormat};
pub use formats::{generator_for, FormatGenerator, GeneratorOptions};
pub use service::{
    Credential, FetchOutcome, FetchQuery, SubscriptionContent, SubscriptionService, UserInfo,
};
