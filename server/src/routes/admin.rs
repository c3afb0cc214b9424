//! Admin endpoints

use crate::error::ApiResult;
use crate::extract::AdminUser;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpanel_core::models::{Coupon, InviteCode, Order, Plan, Subscription};
use vpanel_core::store::{Page, SubscriptionFilter};
use vpanel_core::CacheStats;

#[derive(Debug, Deserialize)]
pub struct SubscriptionListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub user_id: Option<u64>,
    pub min_access_count: Option<u64>,
    pub max_access_count: Option<u64>,
    pub last_access_after: Option<DateTime<Utc>>,
    pub last_access_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// `GET /api/admin/subscriptions`
pub async fn list_subscriptions(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<SubscriptionListQuery>,
) -> ApiResult<Json<Paged<Subscription>>> {
    let filter = SubscriptionFilter {
        user_id: query.user_id,
        min_access_count: query.min_access_count,
        max_access_count: query.max_access_count,
        last_access_after: query.last_access_after,
        last_access_before: query.last_access_before,
    };
    let page = Page {
        number: query.page.unwrap_or(1),
        size: query.page_size.unwrap_or(20).min(100),
    };
    let (items, total) = state.subscriptions.list(&filter, page).await?;
    Ok(Json(Paged { items, total }))
}

/// `DELETE /api/admin/subscriptions/{user_id}`
pub async fn revoke_subscription(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<u64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.subscriptions.revoke(user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /api/admin/subscriptions/{user_id}/reset-stats`
pub async fn reset_subscription_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<u64>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(state.subscriptions.reset_stats(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateInviteBody {
    #[serde(default = "default_max_uses")]
    pub max_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

const fn default_max_uses() -> u32 {
    1
}

/// `POST /api/admin/invites`
pub async fn create_invite(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(body): Json<CreateInviteBody>,
) -> ApiResult<Json<InviteCode>> {
    let invite = state
        .portal
        .create_invite(admin.0.user.id, body.max_uses, body.expires_at)
        .await?;
    Ok(Json(invite))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanBody {
    pub name: String,
    pub price: i64,
    pub duration_days: i64,
    #[serde(default)]
    pub traffic_limit: u64,
    #[serde(default = "default_plan_type")]
    pub plan_type: String,
    #[serde(default)]
    pub ip_limit: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_recommended: bool,
    pub group_id: Option<u64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub payment_methods: Vec<String>,
    #[serde(default)]
    pub prices: std::collections::BTreeMap<String, i64>,
}

fn default_plan_type() -> String {
    "standard".to_string()
}

const fn default_true() -> bool {
    true
}

/// `POST /api/admin/plans`
pub async fn create_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CreatePlanBody>,
) -> ApiResult<Json<Plan>> {
    let plan = Plan {
        id: 0,
        name: body.name,
        price: body.price,
        duration_days: body.duration_days,
        traffic_limit: body.traffic_limit,
        plan_type: body.plan_type,
        reset_cycle: vpanel_core::models::ResetCycle::Monthly,
        ip_limit: body.ip_limit,
        is_active: body.is_active,
        is_recommended: body.is_recommended,
        group_id: body.group_id,
        features: body.features,
        payment_methods: body.payment_methods,
        prices: body.prices,
        created_at: Utc::now(),
    };
    Ok(Json(state.plans.create(plan).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponBody {
    pub code: String,
    pub name: String,
    pub coupon_type: vpanel_core::models::CouponType,
    pub value: i64,
    #[serde(default)]
    pub min_order_amount: i64,
    #[serde(default)]
    pub max_discount: i64,
    #[serde(default)]
    pub total_limit: u32,
    #[serde(default)]
    pub per_user_limit: u32,
    #[serde(default)]
    pub plan_ids: Vec<u64>,
    pub start_at: Option<DateTime<Utc>>,
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CreateCouponBody {
    fn into_coupon(self) -> Coupon {
        Coupon {
            id: 0,
            code: self.code,
            name: self.name,
            coupon_type: self.coupon_type,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            total_limit: self.total_limit,
            per_user_limit: self.per_user_limit,
            used_count: 0,
            plan_ids: self.plan_ids,
            start_at: self.start_at,
            expire_at: self.expire_at,
            is_active: self.is_active,
        }
    }
}

/// `POST /api/admin/coupons`
pub async fn create_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CreateCouponBody>,
) -> ApiResult<Json<Coupon>> {
    Ok(Json(state.coupons.create(body.into_coupon()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CouponBatchBody {
    #[serde(flatten)]
    pub template: CreateCouponBody,
    pub prefix: String,
    pub count: usize,
}

/// `POST /api/admin/coupons/batch`
pub async fn create_coupon_batch(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<CouponBatchBody>,
) -> ApiResult<Json<Vec<Coupon>>> {
    let batch = state
        .coupons
        .create_batch(
            &body.template.into_coupon(),
            &body.prefix,
            body.count.min(1000),
        )
        .await?;
    Ok(Json(batch))
}

/// `DELETE /api/admin/users/{user_id}`
///
/// Destroys the account and cascades to its subscription, proxies, auth
/// tokens and trial. History tables (ledger, coupon usage) stay.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<u64>,
) -> ApiResult<Json<serde_json::Value>> {
    if user_id == admin.0.user.id {
        return Err(vpanel_core::PanelError::validation("cannot delete yourself").into());
    }
    state.users.delete(user_id).await?;
    state.proxies.delete_by_user(user_id).await?;
    if let Err(err) = state.subscriptions.revoke(user_id).await {
        // No subscription is fine; anything else still tears the rest down.
        tracing::debug!(user_id, error = %err, "no subscription to revoke");
    }
    state.auth_tokens.delete_by_user(user_id).await?;
    state.trials.remove_for_user(user_id).await?;
    tracing::info!(user_id, "user deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /api/admin/orders/{id}/refund`
pub async fn refund_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.refund(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceBody {
    pub amount: i64,
    pub reason: String,
}

/// `POST /api/admin/users/{id}/balance`
pub async fn adjust_balance(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<u64>,
    Json(body): Json<AdjustBalanceBody>,
) -> ApiResult<Json<vpanel_core::models::BalanceTransaction>> {
    let tx = state
        .balance
        .adjust(user_id, body.amount, &body.reason, &admin.0.user.username)
        .await?;
    Ok(Json(tx))
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub items: u64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            deletes: stats.deletes,
            items: stats.items,
        }
    }
}

/// `GET /api/admin/cache/stats`
pub async fn cache_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<CacheStatsResponse> {
    Json(state.cache.stats().into())
}
