//! Core data model for the panel
//!
//! Conventions: money is an integer minor unit (cents), traffic is an
//! integer byte count, times are absolute UTC instants. Ids are opaque
//! `u64`s allocated by the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// A panel account
///
/// Created on register, destroyed only by an admin; deletion cascades to the
/// subscription, proxies, auth tokens and trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    /// Unique login name
    pub username: String,
    /// Unique contact address
    pub email: String,
    /// bcrypt hash, never the clear text
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub enabled: bool,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    /// Account service cut-off; `None` means no expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Traffic allowance in bytes; 0 means unlimited
    pub traffic_limit: u64,
    /// Bytes consumed so far
    pub traffic_used: u64,
    /// Referrer who invited this account, if any
    pub inviter_id: Option<u64>,
    /// Monotonic token epoch; bumping it invalidates all outstanding JWTs
    pub token_version: u32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// An account is serviceable iff it is enabled, not past its expiry and
    /// not over its traffic allowance.
    #[must_use]
    pub fn is_serviceable(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.expires_at.is_none_or(|exp| now < exp)
            && (self.traffic_limit == 0 || self.traffic_used < self.traffic_limit)
    }
}

/// Supported outbound protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
}

impl ProxyProtocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "shadowsocks",
        }
    }

    /// Parse the lowercase protocol name used in filters and settings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vmess" => Some(Self::Vmess),
            "vless" => Some(Self::Vless),
            "trojan" => Some(Self::Trojan),
            "shadowsocks" | "ss" => Some(Self::Shadowsocks),
            _ => None,
        }
    }
}

/// Open-ended per-proxy settings map
///
/// Generators read known keys defensively through the typed accessors and
/// fall back to defaults for anything missing or mistyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxySettings(pub BTreeMap<String, serde_json::Value>);

impl ProxySettings {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) -> &mut Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.0.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }

    #[must_use]
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.0.get(key).and_then(serde_json::Value::as_u64).unwrap_or(default)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(serde_json::Value::as_bool).unwrap_or(default)
    }
}

/// One outbound server belonging to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: u64,
    pub user_id: u64,
    /// Display name shown by client apps
    pub name: String,
    pub remark: Option<String>,
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    /// Protocol-specific fields: `uuid`, `password`, `method`, `network`,
    /// `security`, `sni`, `path`, `ws_host`, `flow`, `public_key`,
    /// `short_id`, `alter_id`, `alpn`, ...
    pub settings: ProxySettings,
    pub enabled: bool,
    /// Remote node this proxy is provisioned on, if any
    pub node_id: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// A user's durable subscription endpoint
///
/// Exactly one per user. Regeneration replaces `token` and `short_code`
/// atomically; the previous values cease to resolve immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub user_id: u64,
    /// Secret of at least 32 hex characters
    pub token: String,
    /// 8-character `[a-zA-Z0-9]` alias
    pub short_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

/// Single-use password-reset token, valid for one hour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: u64,
    pub user_id: u64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Single-use email-verification token, valid for 24 hours
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerificationToken {
    pub id: u64,
    pub user_id: u64,
    /// Address being verified; may differ from the user's current email
    /// while a change is in flight
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Registration invite code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCode {
    pub id: u64,
    pub code: String,
    pub created_by: u64,
    /// Last account that consumed the code
    pub used_by: Option<u64>,
    pub max_uses: u32,
    pub used_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InviteCode {
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_count < self.max_uses && self.expires_at.is_none_or(|exp| now < exp)
    }
}

/// Per-user TOTP enrolment record
///
/// `enabled_at` is set only after the user has proven possession of the
/// secret with a valid code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSecret {
    pub id: u64,
    pub user_id: u64,
    /// Base32-encoded shared secret
    pub secret: String,
    /// One-shot 8-character recovery codes
    pub backup_codes: Vec<String>,
    pub enabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Plan reset cycle for traffic accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetCycle {
    None,
    Monthly,
}

/// A sellable bundle of traffic and duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: u64,
    pub name: String,
    /// Price in cents of the base currency
    pub price: i64,
    /// Service period granted on purchase; 0 means non-expiring
    pub duration_days: i64,
    /// Traffic granted in bytes; 0 means unlimited
    pub traffic_limit: u64,
    pub plan_type: String,
    pub reset_cycle: ResetCycle,
    /// Concurrent-IP cap; 0 means unlimited
    pub ip_limit: u32,
    pub is_active: bool,
    pub is_recommended: bool,
    pub group_id: Option<u64>,
    pub features: Vec<String>,
    pub payment_methods: Vec<String>,
    /// Per-currency price overlay; lookup falls back to converting `price`
    pub prices: BTreeMap<String, i64>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Normalized 30-day price, 0 for non-expiring plans.
    #[must_use]
    pub const fn monthly_price(&self) -> i64 {
        if self.duration_days > 0 {
            self.price * 30 / self.duration_days
        } else {
            0
        }
    }
}

/// Display grouping for plans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanGroup {
    pub id: u64,
    pub name: String,
    pub sort_order: u32,
}

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Legal transition matrix. `Cancelled` and `Refunded` are terminal.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Completed | Self::Refunded)
                | (Self::Completed, Self::Refunded)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

/// A purchase intent with its settlement record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    /// Unique, shaped `ORD-YYYYMMDD-XXXXXXXX` (lowercase hex tail)
    pub order_no: String,
    pub user_id: u64,
    pub plan_id: u64,
    pub coupon_id: Option<u64>,
    /// Plan price before any deduction, cents
    pub original_amount: i64,
    /// Coupon deduction, cents
    pub discount_amount: i64,
    /// Wallet balance applied, cents
    pub balance_used: i64,
    /// Amount the payment channel must collect, cents
    pub pay_amount: i64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    /// Channel-side transaction reference
    pub payment_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Unpaid orders past this instant are swept to `cancelled`
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Coupon discount shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponType {
    /// `value` is cents off
    Fixed,
    /// `value` is in 1/10000 units, 1000 = 10%
    Percentage,
}

/// A reusable discount code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: u64,
    /// Uppercase, unique
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    pub value: i64,
    /// Minimum order amount in cents; 0 disables the floor
    pub min_order_amount: i64,
    /// Cap for percentage discounts in cents; 0 disables the cap
    pub max_discount: i64,
    /// Total redemptions across all users; 0 means unlimited
    pub total_limit: u32,
    /// Redemptions per user; 0 means unlimited
    pub per_user_limit: u32,
    pub used_count: u32,
    /// Restrict to these plans; empty means any plan
    pub plan_ids: Vec<u64>,
    pub start_at: Option<DateTime<Utc>>,
    pub expire_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Append-only record of one coupon redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponUsage {
    pub id: u64,
    pub coupon_id: u64,
    pub user_id: u64,
    pub order_id: u64,
    pub discount: i64,
    pub used_at: DateTime<Utc>,
}

/// Balance ledger entry categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Recharge,
    Purchase,
    Refund,
    Commission,
    Adjustment,
}

/// One signed movement on a user's balance
///
/// The live balance always equals the signed sum of the user's
/// transactions; `balance` records the post-transaction value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: u64,
    pub user_id: u64,
    pub tx_type: TransactionType,
    /// Signed amount in cents
    pub amount: i64,
    /// Balance after this transaction, cents
    pub balance: i64,
    pub order_id: Option<u64>,
    pub description: String,
    /// Who performed the mutation: `"system"`, `"user"` or an admin name
    pub operator: String,
    pub created_at: DateTime<Utc>,
}

/// Referral commission states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A deferred credit to a referrer, derived from an invitee's paid order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: u64,
    /// Beneficiary (the referrer)
    pub user_id: u64,
    /// Invitee whose order produced this commission
    pub from_user_id: u64,
    pub order_id: u64,
    /// Credit in cents
    pub amount: i64,
    /// Rate applied, basis points
    pub rate: u32,
    /// Referral depth; the panel only pays level 1
    pub level: u32,
    pub status: CommissionStatus,
    pub confirm_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Trial lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Active,
    Expired,
    Converted,
}

/// One-per-user-forever free trial record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub id: u64,
    pub user_id: u64,
    pub status: TrialStatus,
    pub start_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub traffic_used: u64,
    pub converted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role: Role::User,
            enabled: true,
            email_verified: true,
            two_factor_enabled: false,
            expires_at: None,
            traffic_limit: 0,
            traffic_used: 0,
            inviter_id: None,
            token_version: 0,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_serviceable_predicate() {
        let now = Utc::now();
        let mut u = user();
        assert!(u.is_serviceable(now));

        u.enabled = false;
        assert!(!u.is_serviceable(now));

        u.enabled = true;
        u.expires_at = Some(now - Duration::seconds(1));
        assert!(!u.is_serviceable(now));

        u.expires_at = Some(now + Duration::hours(1));
        assert!(u.is_serviceable(now));

        u.traffic_limit = 100;
        u.traffic_used = 100;
        assert!(!u.is_serviceable(now));

        // traffic_limit == 0 means unlimited
        u.traffic_limit = 0;
        assert!(u.is_serviceable(now));
    }

    #[test]
    fn test_order_transition_matrix() {
        use OrderStatus::{Cancelled, Completed, Paid, Pending, Refunded};
        let all = [Pending, Paid, Completed, Cancelled, Refunded];
        let legal = [
            (Pending, Paid),
            (Pending, Cancelled),
            (Paid, Completed),
            (Paid, Refunded),
            (Completed, Refunded),
        ];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_monthly_price_derivation() {
        let mut plan = Plan {
            id: 1,
            name: "Quarterly".to_string(),
            price: 9000,
            duration_days: 90,
            traffic_limit: 0,
            plan_type: "standard".to_string(),
            reset_cycle: ResetCycle::Monthly,
            ip_limit: 3,
            is_active: true,
            is_recommended: false,
            group_id: None,
            features: vec![],
            payment_methods: vec![],
            prices: BTreeMap::new(),
            created_at: Utc::now(),
        };
        assert_eq!(plan.monthly_price(), 3000);

        plan.duration_days = 0;
        assert_eq!(plan.monthly_price(), 0);
    }

    #[test]
    fn test_invite_code_validity() {
        let now = Utc::now();
        let mut invite = InviteCode {
            id: 1,
            code: "WELCOME".to_string(),
            created_by: 1,
            used_by: None,
            max_uses: 2,
            used_count: 0,
            expires_at: None,
            created_at: now,
        };
        assert!(invite.is_valid(now));

        invite.used_count = 2;
        assert!(!invite.is_valid(now));

        invite.used_count = 1;
        invite.expires_at = Some(now - Duration::minutes(1));
        assert!(!invite.is_valid(now));
    }

    #[test]
    fn test_settings_typed_accessors() {
        let mut settings = ProxySettings::new();
        settings.set("path", "/ws").set("port", 8443_u64).set("tls", true);
        assert_eq!(settings.get_str("path", "/"), "/ws");
        assert_eq!(settings.get_str("missing", "/"), "/");
        assert_eq!(settings.get_u64("port", 0), 8443);
        assert!(settings.get_bool("tls", false));
        // Mistyped value falls back to the default
        assert_eq!(settings.get_u64("path", 7), 7);
    }
}
