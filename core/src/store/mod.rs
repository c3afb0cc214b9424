//! Persistence interface of the panel
//!
//! The SQL layer is an external collaborator; the core talks to it through
//! the store traits in this module. Each trait is the contract one table
//! family must honor, including its uniqueness constraints, which
//! implementations surface as [`PanelError::Conflict`].
//!
//! The in-memory implementations in [`memory`] back single-node deployments
//! and the test suite.

pub mod memory;

use crate::error::Result;
use crate::models::{
    BalanceTransaction, Commission, CommissionStatus, Coupon, CouponUsage, EmailVerificationToken,
    InviteCode, Order, OrderStatus, PasswordResetToken, Plan, PlanGroup, Proxy, Subscription,
    Trial, TwoFactorSecret, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{
    MemoryAuthTokenStore, MemoryBalanceStore, MemoryCommissionStore, MemoryCouponStore,
    MemoryOrderStore, MemoryPlanStore, MemoryProxyStore, MemorySubscriptionStore,
    MemoryTrialStore, MemoryUserStore,
};

/// Page request shared by the listing operations
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// 1-based page number
    pub number: u64,
    pub size: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 20 }
    }
}

impl Page {
    /// Slice `items` down to this page, returning the page and total count.
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, u64) {
        let total = items.len() as u64;
        let size = self.size.max(1) as usize;
        let start = (self.number.max(1) - 1) as usize * size;
        let page = items.into_iter().skip(start).take(size).collect();
        (page, total)
    }
}

/// Filter for the admin subscription listing
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub user_id: Option<u64>,
    pub min_access_count: Option<u64>,
    pub max_access_count: Option<u64>,
    pub last_access_after: Option<DateTime<Utc>>,
    pub last_access_before: Option<DateTime<Utc>>,
}

/// User accounts. Unique on `username` and `email`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert `user` (its `id` is ignored) and return it with an id assigned.
    async fn create(&self, user: User) -> Result<User>;
    async fn get(&self, id: u64) -> Result<Option<User>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Lookup by username first, then email.
    async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        if let Some(user) = self.get_by_username(login).await? {
            return Ok(Some(user));
        }
        self.get_by_email(login).await
    }
    /// Persist all mutable fields of an existing row.
    async fn update(&self, user: &User) -> Result<()>;
    async fn delete(&self, id: u64) -> Result<()>;
    async fn list(&self, page: Page) -> Result<(Vec<User>, u64)>;
}

/// Per-user proxies. The subscription engine reads only enabled rows.
#[async_trait]
pub trait ProxyStore: Send + Sync {
    async fn create(&self, proxy: Proxy) -> Result<Proxy>;
    async fn get(&self, id: u64) -> Result<Option<Proxy>>;
    /// All proxies of `user_id` in insertion order, optionally enabled only.
    async fn list_by_user(&self, user_id: u64, enabled_only: bool) -> Result<Vec<Proxy>>;
    async fn update(&self, proxy: &Proxy) -> Result<()>;
    async fn delete(&self, id: u64) -> Result<()>;
    async fn delete_by_user(&self, user_id: u64) -> Result<()>;
}

/// Subscriptions. Unique on `user_id`, `token` and `short_code`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, sub: Subscription) -> Result<Subscription>;
    async fn get_by_user(&self, user_id: u64) -> Result<Option<Subscription>>;
    async fn get_by_token(&self, token: &str) -> Result<Option<Subscription>>;
    async fn get_by_short_code(&self, short_code: &str) -> Result<Option<Subscription>>;
    async fn update(&self, sub: &Subscription) -> Result<()>;
    async fn delete_by_user(&self, user_id: u64) -> Result<()>;
    async fn list(&self, filter: &SubscriptionFilter, page: Page)
        -> Result<(Vec<Subscription>, u64)>;
}

/// The four single-use / expiring auth-token families plus 2FA enrolment
#[async_trait]
pub trait AuthTokenStore: Send + Sync {
    async fn create_reset_token(&self, token: PasswordResetToken) -> Result<PasswordResetToken>;
    async fn get_reset_token(&self, token: &str) -> Result<Option<PasswordResetToken>>;
    async fn mark_reset_used(&self, id: u64, at: DateTime<Utc>) -> Result<()>;
    /// Reset tokens issued for `user_id` at or after `since`, used or not.
    async fn count_reset_tokens_since(&self, user_id: u64, since: DateTime<Utc>) -> Result<u32>;

    async fn create_email_token(
        &self,
        token: EmailVerificationToken,
    ) -> Result<EmailVerificationToken>;
    async fn get_email_token(&self, token: &str) -> Result<Option<EmailVerificationToken>>;
    async fn mark_email_verified(&self, id: u64, at: DateTime<Utc>) -> Result<()>;

    async fn create_invite(&self, invite: InviteCode) -> Result<InviteCode>;
    async fn get_invite(&self, code: &str) -> Result<Option<InviteCode>>;
    async fn update_invite(&self, invite: &InviteCode) -> Result<()>;

    /// Insert or replace the user's (not yet enabled) secret.
    async fn upsert_two_factor(&self, secret: TwoFactorSecret) -> Result<TwoFactorSecret>;
    async fn get_two_factor(&self, user_id: u64) -> Result<Option<TwoFactorSecret>>;
    async fn update_two_factor(&self, secret: &TwoFactorSecret) -> Result<()>;
    async fn delete_two_factor(&self, user_id: u64) -> Result<()>;

    /// Cascade helper for account deletion.
    async fn delete_by_user(&self, user_id: u64) -> Result<()>;
}

/// Plans and their display groups
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn create(&self, plan: Plan) -> Result<Plan>;
    async fn get(&self, id: u64) -> Result<Option<Plan>>;
    async fn list(&self, active_only: bool) -> Result<Vec<Plan>>;
    async fn update(&self, plan: &Plan) -> Result<()>;
    async fn create_group(&self, group: PlanGroup) -> Result<PlanGroup>;
    async fn list_groups(&self) -> Result<Vec<PlanGroup>>;
}

/// Orders. Unique on `order_no`; status transitions are optimistic.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<Order>;
    async fn get(&self, id: u64) -> Result<Option<Order>>;
    async fn get_by_order_no(&self, order_no: &str) -> Result<Option<Order>>;
    /// Atomically move `id` from `from` to `to`, applying `patch` to the row
    /// while it still holds status `from`. Fails with `Conflict` when the
    /// row's current status is not `from`.
    async fn transition(
        &self,
        id: u64,
        from: OrderStatus,
        to: OrderStatus,
        patch: Option<OrderPatch>,
    ) -> Result<Order>;
    async fn list_by_user(
        &self,
        user_id: u64,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<Order>, u64)>;
    /// `pending` orders whose `expired_at` is before `now`.
    async fn list_pending_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Settlement fields written together with a status transition
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Coupons and their append-only usage history
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn create(&self, coupon: Coupon) -> Result<Coupon>;
    async fn get(&self, id: u64) -> Result<Option<Coupon>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn update(&self, coupon: &Coupon) -> Result<()>;
    /// Append a usage row and bump the coupon's `used_count` atomically.
    async fn record_usage(&self, usage: CouponUsage) -> Result<CouponUsage>;
    async fn count_usages_by_user(&self, coupon_id: u64, user_id: u64) -> Result<u32>;
}

/// The balance ledger. Rows are append-only.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Append `tx` (id assigned by the store) and update the live balance.
    async fn append(&self, tx: BalanceTransaction) -> Result<BalanceTransaction>;
    /// Live balance, equal to the signed sum of the user's transactions.
    async fn balance_of(&self, user_id: u64) -> Result<i64>;
    async fn list_by_user(&self, user_id: u64, page: Page)
        -> Result<(Vec<BalanceTransaction>, u64)>;
}

/// Referral commissions
#[async_trait]
pub trait CommissionStore: Send + Sync {
    async fn create(&self, commission: Commission) -> Result<Commission>;
    async fn get(&self, id: u64) -> Result<Option<Commission>>;
    async fn update(&self, commission: &Commission) -> Result<()>;
    /// `pending` rows created at or before `cutoff`.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Commission>>;
    async fn list_by_order(
        &self,
        order_id: u64,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>>;
    async fn list_by_user(&self, user_id: u64, page: Page) -> Result<(Vec<Commission>, u64)>;
}

/// Trials. Unique on `user_id`, forever.
#[async_trait]
pub trait TrialStore: Send + Sync {
    async fn create(&self, trial: Trial) -> Result<Trial>;
    async fn get_by_user(&self, user_id: u64) -> Result<Option<Trial>>;
    async fn update(&self, trial: &Trial) -> Result<()>;
    /// `active` rows whose `expire_at` is before `now`.
    async fn list_active_expired(&self, now: DateTime<Utc>) -> Result<Vec<Trial>>;
    async fn delete_by_user(&self, user_id: u64) -> Result<()>;
}
