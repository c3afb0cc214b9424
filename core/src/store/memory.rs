//! In-memory store implementations
//!
//! Reader/writer maps guarded by `std::sync::RwLock`; guards are never held
//! across an await point. Id allocation is a per-store atomic counter.
//! Uniqueness constraints the schema would enforce (username, email, token,
//! short code, order number, one trial per user) are checked under the
//! write lock and surfaced as `Conflict`.

use super::{OrderPatch, Page, SubscriptionFilter};
use crate::error::{PanelError, Result};
use crate::models::{
    BalanceTransaction, Commission, CommissionStatus, Coupon, CouponUsage, EmailVerificationToken,
    InviteCode, Order, OrderStatus, PasswordResetToken, Plan, PlanGroup, Proxy, Subscription,
    Trial, TwoFactorSecret, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Users keyed by id with unique username/email
#[derive(Default)]
pub struct MemoryUserStore {
    rows: RwLock<HashMap<u64, User>>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::UserStore for MemoryUserStore {
    async fn create(&self, mut user: User) -> Result<User> {
        let mut rows = write(&self.rows);
        if rows.values().any(|u| u.username == user.username) {
            return Err(PanelError::conflict("username already taken"));
        }
        if rows.values().any(|u| u.email == user.email) {
            return Err(PanelError::conflict("email already registered"));
        }
        user.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: u64) -> Result<Option<User>> {
        Ok(read(&self.rows).get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(read(&self.rows)
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(read(&self.rows).values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut rows = write(&self.rows);
        if rows
            .values()
            .any(|u| u.id != user.id && (u.username == user.username || u.email == user.email))
        {
            return Err(PanelError::conflict("username or email already taken"));
        }
        match rows.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("user")),
        }
    }

    async fn delete(&self, id: u64) -> Result<()> {
        match write(&self.rows).remove(&id) {
            Some(_) => Ok(()),
            None => Err(PanelError::not_found("user")),
        }
    }

    async fn list(&self, page: Page) -> Result<(Vec<User>, u64)> {
        let mut users: Vec<User> = read(&self.rows).values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(page.apply(users))
    }
}

/// Proxies keyed by id, listed in insertion order
#[derive(Default)]
pub struct MemoryProxyStore {
    rows: RwLock<HashMap<u64, Proxy>>,
    next_id: AtomicU64,
}

impl MemoryProxyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::ProxyStore for MemoryProxyStore {
    async fn create(&self, mut proxy: Proxy) -> Result<Proxy> {
        proxy.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        write(&self.rows).insert(proxy.id, proxy.clone());
        Ok(proxy)
    }

    async fn get(&self, id: u64) -> Result<Option<Proxy>> {
        Ok(read(&self.rows).get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: u64, enabled_only: bool) -> Result<Vec<Proxy>> {
        let mut proxies: Vec<Proxy> = read(&self.rows)
            .values()
            .filter(|p| p.user_id == user_id && (!enabled_only || p.enabled))
            .cloned()
            .collect();
        proxies.sort_by_key(|p| p.id);
        Ok(proxies)
    }

    async fn update(&self, proxy: &Proxy) -> Result<()> {
        match write(&self.rows).get_mut(&proxy.id) {
            Some(row) => {
                *row = proxy.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("proxy")),
        }
    }

    async fn delete(&self, id: u64) -> Result<()> {
        match write(&self.rows).remove(&id) {
            Some(_) => Ok(()),
            None => Err(PanelError::not_found("proxy")),
        }
    }

    async fn delete_by_user(&self, user_id: u64) -> Result<()> {
        write(&self.rows).retain(|_, p| p.user_id != user_id);
        Ok(())
    }
}

/// Subscriptions with unique user/token/short-code indexes
#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: RwLock<HashMap<u64, Subscription>>,
    next_id: AtomicU64,
}

impl MemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::SubscriptionStore for MemorySubscriptionStore {
    async fn create(&self, mut sub: Subscription) -> Result<Subscription> {
        let mut rows = write(&self.rows);
        if rows.values().any(|s| s.user_id == sub.user_id) {
            return Err(PanelError::conflict("subscription already exists for user"));
        }
        if rows
            .values()
            .any(|s| s.token == sub.token || s.short_code == sub.short_code)
        {
            return Err(PanelError::conflict("subscription token collision"));
        }
        sub.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn get_by_user(&self, user_id: u64) -> Result<Option<Subscription>> {
        Ok(read(&self.rows)
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Subscription>> {
        Ok(read(&self.rows).values().find(|s| s.token == token).cloned())
    }

    async fn get_by_short_code(&self, short_code: &str) -> Result<Option<Subscription>> {
        Ok(read(&self.rows)
            .values()
            .find(|s| s.short_code == short_code)
            .cloned())
    }

    async fn update(&self, sub: &Subscription) -> Result<()> {
        let mut rows = write(&self.rows);
        if rows
            .values()
            .any(|s| s.id != sub.id && (s.token == sub.token || s.short_code == sub.short_code))
        {
            return Err(PanelError::conflict("subscription token collision"));
        }
        match rows.get_mut(&sub.id) {
            Some(row) => {
                *row = sub.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("subscription")),
        }
    }

    async fn delete_by_user(&self, user_id: u64) -> Result<()> {
        write(&self.rows).retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn list(
        &self,
        filter: &SubscriptionFilter,
        page: Page,
    ) -> Result<(Vec<Subscription>, u64)> {
        let mut subs: Vec<Subscription> = read(&self.rows)
            .values()
            .filter(|s| filter.user_id.is_none_or(|u| s.user_id == u))
            .filter(|s| filter.min_access_count.is_none_or(|n| s.access_count >= n))
            .filter(|s| filter.max_access_count.is_none_or(|n| s.access_count <= n))
            .filter(|s| {
                filter
                    .last_access_after
                    .is_none_or(|t| s.last_access_at.is_some_and(|a| a >= t))
            })
            .filter(|s| {
                filter
                    .last_access_before
                    .is_none_or(|t| s.last_access_at.is_some_and(|a| a <= t))
            })
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.id);
        Ok(page.apply(subs))
    }
}

#[derive(Default)]
struct AuthTokenRows {
    resets: HashMap<u64, PasswordResetToken>,
    emails: HashMap<u64, EmailVerificationToken>,
    invites: HashMap<u64, InviteCode>,
    two_factor: HashMap<u64, TwoFactorSecret>,
}

/// Password-reset, email-verification, invite and 2FA records
#[derive(Default)]
pub struct MemoryAuthTokenStore {
    rows: RwLock<AuthTokenRows>,
    next_id: AtomicU64,
}

impl MemoryAuthTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl super::AuthTokenStore for MemoryAuthTokenStore {
    async fn create_reset_token(
        &self,
        mut token: PasswordResetToken,
    ) -> Result<PasswordResetToken> {
        token.id = self.next();
        write(&self.rows).resets.insert(token.id, token.clone());
        Ok(token)
    }

    async fn get_reset_token(&self, token: &str) -> Result<Option<PasswordResetToken>> {
        Ok(read(&self.rows)
            .resets
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn mark_reset_used(&self, id: u64, at: DateTime<Utc>) -> Result<()> {
        match write(&self.rows).resets.get_mut(&id) {
            Some(row) => {
                row.used_at = Some(at);
                Ok(())
            }
            None => Err(PanelError::not_found("password reset token")),
        }
    }

    async fn count_reset_tokens_since(&self, user_id: u64, since: DateTime<Utc>) -> Result<u32> {
        let count = read(&self.rows)
            .resets
            .values()
            .filter(|t| t.user_id == user_id && t.created_at >= since)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn create_email_token(
        &self,
        mut token: EmailVerificationToken,
    ) -> Result<EmailVerificationToken> {
        token.id = self.next();
        write(&self.rows).emails.insert(token.id, token.clone());
        Ok(token)
    }

    async fn get_email_token(&self, token: &str) -> Result<Option<EmailVerificationToken>> {
        Ok(read(&self.rows)
            .emails
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn mark_email_verified(&self, id: u64, at: DateTime<Utc>) -> Result<()> {
        match write(&self.rows).emails.get_mut(&id) {
            Some(row) => {
                row.verified_at = Some(at);
                Ok(())
            }
            None => Err(PanelError::not_found("email verification token")),
        }
    }

    async fn create_invite(&self, mut invite: InviteCode) -> Result<InviteCode> {
        let mut rows = write(&self.rows);
        if rows.invites.values().any(|i| i.code == invite.code) {
            return Err(PanelError::conflict("invite code already exists"));
        }
        invite.id = self.next();
        rows.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    async fn get_invite(&self, code: &str) -> Result<Option<InviteCode>> {
        Ok(read(&self.rows)
            .invites
            .values()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn update_invite(&self, invite: &InviteCode) -> Result<()> {
        match write(&self.rows).invites.get_mut(&invite.id) {
            Some(row) => {
                *row = invite.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("invite code")),
        }
    }

    async fn upsert_two_factor(&self, mut secret: TwoFactorSecret) -> Result<TwoFactorSecret> {
        let mut rows = write(&self.rows);
        if let Some(existing) = rows
            .two_factor
            .values()
            .find(|s| s.user_id == secret.user_id)
        {
            secret.id = existing.id;
        } else {
            secret.id = self.next();
        }
        rows.two_factor.insert(secret.id, secret.clone());
        Ok(secret)
    }

    async fn get_two_factor(&self, user_id: u64) -> Result<Option<TwoFactorSecret>> {
        Ok(read(&self.rows)
            .two_factor
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn update_two_factor(&self, secret: &TwoFactorSecret) -> Result<()> {
        match write(&self.rows).two_factor.get_mut(&secret.id) {
            Some(row) => {
                *row = secret.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("two-factor secret")),
        }
    }

    async fn delete_two_factor(&self, user_id: u64) -> Result<()> {
        write(&self.rows).two_factor.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn delete_by_user(&self, user_id: u64) -> Result<()> {
        let mut rows = write(&self.rows);
        rows.resets.retain(|_, t| t.user_id != user_id);
        rows.emails.retain(|_, t| t.user_id != user_id);
        rows.two_factor.retain(|_, s| s.user_id != user_id);
        Ok(())
    }
}

#[derive(Default)]
struct PlanRows {
    plans: HashMap<u64, Plan>,
    groups: HashMap<u64, PlanGroup>,
}

/// Plans and plan groups
#[derive(Default)]
pub struct MemoryPlanStore {
    rows: RwLock<PlanRows>,
    next_id: AtomicU64,
}

impl MemoryPlanStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::PlanStore for MemoryPlanStore {
    async fn create(&self, mut plan: Plan) -> Result<Plan> {
        plan.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        write(&self.rows).plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn get(&self, id: u64) -> Result<Option<Plan>> {
        Ok(read(&self.rows).plans.get(&id).cloned())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = read(&self.rows)
            .plans
            .values()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.id);
        Ok(plans)
    }

    async fn update(&self, plan: &Plan) -> Result<()> {
        match write(&self.rows).plans.get_mut(&plan.id) {
            Some(row) => {
                *row = plan.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("plan")),
        }
    }

    async fn create_group(&self, mut group: PlanGroup) -> Result<PlanGroup> {
        group.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        write(&self.rows).groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<PlanGroup>> {
        let mut groups: Vec<PlanGroup> = read(&self.rows).groups.values().cloned().collect();
        groups.sort_by_key(|g| g.sort_order);
        Ok(groups)
    }
}

/// Orders with optimistic status transitions
#[derive(Default)]
pub struct MemoryOrderStore {
    rows: RwLock<HashMap<u64, Order>>,
    next_id: AtomicU64,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::OrderStore for MemoryOrderStore {
    async fn create(&self, mut order: Order) -> Result<Order> {
        let mut rows = write(&self.rows);
        if rows.values().any(|o| o.order_no == order.order_no) {
            return Err(PanelError::conflict("order number collision"));
        }
        order.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: u64) -> Result<Option<Order>> {
        Ok(read(&self.rows).get(&id).cloned())
    }

    async fn get_by_order_no(&self, order_no: &str) -> Result<Option<Order>> {
        Ok(read(&self.rows)
            .values()
            .find(|o| o.order_no == order_no)
            .cloned())
    }

    async fn transition(
        &self,
        id: u64,
        from: OrderStatus,
        to: OrderStatus,
        patch: Option<OrderPatch>,
    ) -> Result<Order> {
        let mut rows = write(&self.rows);
        let Some(row) = rows.get_mut(&id) else {
            return Err(PanelError::not_found("order"));
        };
        if row.status != from {
            return Err(PanelError::conflict(format!(
                "order {} is {}, expected {}",
                row.order_no,
                row.status.as_str(),
                from.as_str()
            )));
        }
        row.status = to;
        if let Some(patch) = patch {
            if patch.payment_method.is_some() {
                row.payment_method = patch.payment_method;
            }
            if patch.payment_no.is_some() {
                row.payment_no = patch.payment_no;
            }
            if patch.paid_at.is_some() {
                row.paid_at = patch.paid_at;
            }
        }
        Ok(row.clone())
    }

    async fn list_by_user(
        &self,
        user_id: u64,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<Order>, u64)> {
        let mut orders: Vec<Order> = read(&self.rows)
            .values()
            .filter(|o| o.user_id == user_id && status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(orders))
    }

    async fn list_pending_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(read(&self.rows)
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.expired_at < now)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct CouponRows {
    coupons: HashMap<u64, Coupon>,
    usages: Vec<CouponUsage>,
}

/// Coupons plus append-only usage history
#[derive(Default)]
pub struct MemoryCouponStore {
    rows: RwLock<CouponRows>,
    next_id: AtomicU64,
}

impl MemoryCouponStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::CouponStore for MemoryCouponStore {
    async fn create(&self, mut coupon: Coupon) -> Result<Coupon> {
        let mut rows = write(&self.rows);
        if rows.coupons.values().any(|c| c.code == coupon.code) {
            return Err(PanelError::conflict("coupon code already exists"));
        }
        coupon.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn get(&self, id: u64) -> Result<Option<Coupon>> {
        Ok(read(&self.rows).coupons.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(read(&self.rows)
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn update(&self, coupon: &Coupon) -> Result<()> {
        match write(&self.rows).coupons.get_mut(&coupon.id) {
            Some(row) => {
                *row = coupon.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("coupon")),
        }
    }

    async fn record_usage(&self, mut usage: CouponUsage) -> Result<CouponUsage> {
        let mut rows = write(&self.rows);
        let Some(coupon) = rows.coupons.get_mut(&usage.coupon_id) else {
            return Err(PanelError::not_found("coupon"));
        };
        coupon.used_count += 1;
        usage.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.usages.push(usage.clone());
        Ok(usage)
    }

    async fn count_usages_by_user(&self, coupon_id: u64, user_id: u64) -> Result<u32> {
        let count = read(&self.rows)
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id && u.user_id == user_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[derive(Default)]
struct BalanceRows {
    ledger: Vec<BalanceTransaction>,
    balances: HashMap<u64, i64>,
}

/// The append-only balance ledger with a live running balance per user
#[derive(Default)]
pub struct MemoryBalanceStore {
    rows: RwLock<BalanceRows>,
    next_id: AtomicU64,
}

impl MemoryBalanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::BalanceStore for MemoryBalanceStore {
    async fn append(&self, mut tx: BalanceTransaction) -> Result<BalanceTransaction> {
        let mut rows = write(&self.rows);
        tx.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        *rows.balances.entry(tx.user_id).or_insert(0) += tx.amount;
        rows.ledger.push(tx.clone());
        Ok(tx)
    }

    async fn balance_of(&self, user_id: u64) -> Result<i64> {
        Ok(read(&self.rows).balances.get(&user_id).copied().unwrap_or(0))
    }

    async fn list_by_user(
        &self,
        user_id: u64,
        page: Page,
    ) -> Result<(Vec<BalanceTransaction>, u64)> {
        let mut txs: Vec<BalanceTransaction> = read(&self.rows)
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page.apply(txs))
    }
}

/// Referral commissions
#[derive(Default)]
pub struct MemoryCommissionStore {
    rows: RwLock<HashMap<u64, Commission>>,
    next_id: AtomicU64,
}

impl MemoryCommissionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::CommissionStore for MemoryCommissionStore {
    async fn create(&self, mut commission: Commission) -> Result<Commission> {
        commission.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        write(&self.rows).insert(commission.id, commission.clone());
        Ok(commission)
    }

    async fn get(&self, id: u64) -> Result<Option<Commission>> {
        Ok(read(&self.rows).get(&id).cloned())
    }

    async fn update(&self, commission: &Commission) -> Result<()> {
        match write(&self.rows).get_mut(&commission.id) {
            Some(row) => {
                *row = commission.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("commission")),
        }
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Commission>> {
        Ok(read(&self.rows)
            .values()
            .filter(|c| c.status == CommissionStatus::Pending && c.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn list_by_order(
        &self,
        order_id: u64,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>> {
        Ok(read(&self.rows)
            .values()
            .filter(|c| c.order_id == order_id && status.is_none_or(|s| c.status == s))
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: u64, page: Page) -> Result<(Vec<Commission>, u64)> {
        let mut rows: Vec<Commission> = read(&self.rows)
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page.apply(rows))
    }
}

/// Trials, unique per user forever
#[derive(Default)]
pub struct MemoryTrialStore {
    rows: RwLock<HashMap<u64, Trial>>,
    next_id: AtomicU64,
}

impl MemoryTrialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::TrialStore for MemoryTrialStore {
    async fn create(&self, mut trial: Trial) -> Result<Trial> {
        let mut rows = write(&self.rows);
        if rows.values().any(|t| t.user_id == trial.user_id) {
            return Err(PanelError::conflict("trial already exists for user"));
        }
        trial.id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        rows.insert(trial.id, trial.clone());
        Ok(trial)
    }

    async fn get_by_user(&self, user_id: u64) -> Result<Option<Trial>> {
        Ok(read(&self.rows)
            .values()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn update(&self, trial: &Trial) -> Result<()> {
        match write(&self.rows).get_mut(&trial.id) {
            Some(row) => {
                *row = trial.clone();
                Ok(())
            }
            None => Err(PanelError::not_found("trial")),
        }
    }

    async fn list_active_expired(&self, now: DateTime<Utc>) -> Result<Vec<Trial>> {
        Ok(read(&self.rows)
            .values()
            .filter(|t| t.status == crate::models::TrialStatus::Active && t.expire_at < now)
            .cloned()
            .collect())
    }

    async fn delete_by_user(&self, user_id: u64) -> Result<()> {
        write(&self.rows).retain(|_, t| t.user_id != user_id);
        Ok(())
    }
}
