//! Router assembly

pub mod admin;
pub mod commerce;
pub mod portal;
pub mod subscription;

use crate::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the full HTTP surface over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Subscription delivery
        .route("/api/subscription/{token}", get(subscription::fetch_by_token))
        .route("/s/{short_code}", get(subscription::fetch_by_short_code))
        // Subscription management
        .route("/api/subscription/link", get(subscription::link))
        .route("/api/subscription/info", get(subscription::info))
        .route("/api/subscription/regenerate", post(subscription::regenerate))
        // Portal auth
        .route("/api/portal/auth/register", post(portal::register))
        .route("/api/portal/auth/login", post(portal::login))
        .route("/api/portal/auth/logout", post(portal::logout))
        .route("/api/portal/auth/refresh", post(portal::refresh))
        .route("/api/portal/auth/forgot-password", post(portal::forgot_password))
        .route("/api/portal/auth/reset-password", post(portal::reset_password))
        .route("/api/portal/auth/verify-email", get(portal::verify_email))
        .route("/api/portal/auth/2fa/enable", post(portal::enable_2fa))
        .route("/api/portal/auth/2fa/verify", post(portal::verify_2fa))
        .route("/api/portal/auth/2fa/disable", post(portal::disable_2fa))
        .route("/api/portal/auth/profile", get(portal::profile))
        .route("/api/portal/auth/profile", put(portal::update_profile))
        .route("/api/portal/auth/password", put(portal::change_password))
        // Commerce
        .route("/api/plans", get(commerce::list_plans))
        .route("/api/orders", post(commerce::create_order))
        .route("/api/orders", get(commerce::list_orders))
        .route("/api/orders/{id}/cancel", post(commerce::cancel_order))
        .route("/api/payment/callback", post(commerce::payment_callback))
        .route("/api/balance", get(commerce::balance))
        .route("/api/balance/transactions", get(commerce::balance_transactions))
        .route("/api/commissions", get(commerce::list_commissions))
        .route("/api/trial/activate", post(commerce::activate_trial))
        // Admin
        .route("/api/admin/subscriptions", get(admin::list_subscriptions))
        .route(
            "/api/admin/subscriptions/{user_id}",
            delete(admin::revoke_subscription),
        )
        .route(
            "/api/admin/subscriptions/{user_id}/reset-stats",
            post(admin::reset_subscription_stats),
        )
        .route("/api/admin/users/{user_id}", delete(admin::delete_user))
        .route("/api/admin/invites", post(admin::create_invite))
        .route("/api/admin/plans", post(admin::create_plan))
        .route("/api/admin/coupons", post(admin::create_coupon))
        .route("/api/admin/coupons/batch", post(admin::create_coupon_batch))
        .route("/api/admin/orders/{id}/refund", post(admin::refund_order))
        .route(
            "/api/admin/users/{user_id}/balance",
            post(admin::adjust_balance),
        )
        .route("/api/admin/cache/stats", get(admin::cache_stats))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
