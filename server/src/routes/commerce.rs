//! Commerce endpoints for the authenticated portal user

use crate::error::ApiResult;
use crate::extract::AuthUser;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use vpanel_core::models::{
    BalanceTransaction, Commission, Order, OrderStatus, Plan, Trial,
};
use vpanel_core::store::Page;
use vpanel_core::{CreateOrderRequest, PanelError};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<String>,
}

impl PageQuery {
    fn page(&self) -> Page {
        Page {
            number: self.page.unwrap_or(1),
            size: self.page_size.unwrap_or(20).min(100),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,
    pub monthly_price: i64,
}

/// `GET /api/plans`
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<PlanView>>> {
    let plans = state.plans.list_active().await?;
    Ok(Json(
        plans
            .into_iter()
            .map(|plan| PlanView {
                monthly_price: plan.monthly_price(),
                plan,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub plan_id: u64,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub balance_to_use: i64,
}

/// `POST /api/orders`
pub async fn create_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateOrderBody>,
) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .create(CreateOrderRequest {
            user_id: auth.user.id,
            plan_id: body.plan_id,
            coupon_code: body.coupon_code,
            balance_to_use: body.balance_to_use,
        })
        .await?;
    Ok(Json(order))
}

/// `GET /api/orders`
pub async fn list_orders(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<Order>>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some("pending") => Some(OrderStatus::Pending),
        Some("paid") => Some(OrderStatus::Paid),
        Some("completed") => Some(OrderStatus::Completed),
        Some("cancelled") => Some(OrderStatus::Cancelled),
        Some("refunded") => Some(OrderStatus::Refunded),
        Some(other) => {
            return Err(PanelError::validation(format!("unknown status '{other}'")).into())
        }
    };
    let (items, total) = state
        .orders
        .list_for_user(auth.user.id, status, query.page())
        .await?;
    Ok(Json(Paged { items, total }))
}

/// `POST /api/orders/{id}/cancel`
pub async fn cancel_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Order>> {
    let order = state.orders.get(id).await?;
    if order.user_id != auth.user.id {
        return Err(PanelError::not_found("order").into());
    }
    Ok(Json(state.orders.cancel(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallbackBody {
    pub order_no: String,
    pub payment_method: String,
    pub payment_no: String,
}

/// `POST /api/payment/callback`
///
/// Payment-channel webhook: marks the order paid and provisions it. The
/// channel's signature check happens upstream of this handler.
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(body): Json<PaymentCallbackBody>,
) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .mark_paid(&body.order_no, &body.payment_method, &body.payment_no)
        .await?;
    let order = state.orders.complete(order.id).await?;
    Ok(Json(order))
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// `GET /api/balance`
pub async fn balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<BalanceResponse>> {
    Ok(Json(BalanceResponse {
        balance: state.balance.balance(auth.user.id).await?,
    }))
}

/// `GET /api/balance/transactions`
pub async fn balance_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<BalanceTransaction>>> {
    let (items, total) = state
        .balance
        .history(auth.user.id, query.page())
        .await?;
    Ok(Json(Paged { items, total }))
}

/// `GET /api/commissions`
pub async fn list_commissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<Commission>>> {
    let (items, total) = state
        .commissions
        .list_for_user(auth.user.id, query.page())
        .await?;
    Ok(Json(Paged { items, total }))
}

/// `POST /api/trial/activate`
pub async fn activate_trial(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Trial>> {
    Ok(Json(state.trials.activate(auth.user.id).await?))
}
