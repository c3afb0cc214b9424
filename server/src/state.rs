//! Shared application state
//!
//! One [`AppState`] is built at startup from the resolved configuration
//! and cloned into every handler. All heavyweight members are behind
//! `Arc`, so the clone is cheap.

use anyhow::Context;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use vpanel_core::auth::{AuthService, PortalAuth, RateLimitConfig, RateLimiter, TokenBlacklist};
use vpanel_core::cache::{Cache, MemoryCache, RedisCache};
use vpanel_core::commerce::{
    BalanceService, CommissionService, CouponService, OrderService, PlanService, TrialService,
};
use vpanel_core::models::{Role, User};
use vpanel_core::notifier::TracingNotifier;
use vpanel_core::store::{
    AuthTokenStore, MemoryAuthTokenStore, MemoryBalanceStore, MemoryCommissionStore,
    MemoryCouponStore, MemoryOrderStore, MemoryPlanStore, MemoryProxyStore,
    MemorySubscriptionStore, MemoryTrialStore, MemoryUserStore, ProxyStore, UserStore,
};
use vpanel_core::subscription::SubscriptionService;
use vpanel_core::{CacheBackend, PanelConfig};

/// Everything the handlers need, cheaply cloneable
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PanelConfig>,
    pub auth: Arc<AuthService>,
    pub users: Arc<dyn UserStore>,
    pub proxies: Arc<dyn ProxyStore>,
    pub auth_tokens: Arc<dyn AuthTokenStore>,
    pub cache: Arc<dyn Cache>,
    pub limiter: Arc<RateLimiter>,
    pub blacklist: Arc<TokenBlacklist>,
    pub portal: Arc<PortalAuth>,
    pub subscriptions: Arc<SubscriptionService>,
    pub plans: Arc<PlanService>,
    pub coupons: Arc<CouponService>,
    pub balance: Arc<BalanceService>,
    pub commissions: Arc<CommissionService>,
    pub trials: Arc<TrialService>,
    pub orders: Arc<OrderService>,
}

impl AppState {
    /// Wire every service from the configuration. Seeds the admin account
    /// when one is configured and missing.
    pub async fn build(config: PanelConfig) -> anyhow::Result<Self> {
        let cache: Arc<dyn Cache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new(
                config.cache.key_prefix.clone(),
                config.cache.max_memory_items,
                Duration::from_secs(config.cache.default_ttl_secs),
            )),
            CacheBackend::Redis => Arc::new(
                RedisCache::connect(
                    &config.cache.redis_url,
                    config.cache.key_prefix.clone(),
                    Duration::from_secs(config.cache.default_ttl_secs),
                )
                .await
                .context("connecting to redis")?,
            ),
        };

        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let proxies: Arc<dyn ProxyStore> = Arc::new(MemoryProxyStore::new());
        let auth_tokens: Arc<dyn AuthTokenStore> = Arc::new(MemoryAuthTokenStore::new());
        let notifier = Arc::new(TracingNotifier);

        let auth = Arc::new(AuthService::new(
            &config.auth.jwt_secret,
            config.auth.token_expiry_hours,
            config.auth.refresh_expiry_hours,
        ));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::login()));
        let blacklist = Arc::new(TokenBlacklist::with_mirror(cache.clone()));
        let portal = Arc::new(PortalAuth::new(
            users.clone(),
            auth_tokens.clone(),
            auth.clone(),
            limiter.clone(),
            blacklist.clone(),
            notifier.clone(),
            config.auth.invite_required,
        ));

        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::new(MemorySubscriptionStore::new()),
            users.clone(),
            proxies.clone(),
            cache.clone(),
            config.subscription.clone(),
        ));

        let plan_store = Arc::new(MemoryPlanStore::new());
        let plans = Arc::new(PlanService::new(
            plan_store.clone(),
            cache.clone(),
            BTreeMap::new(),
        ));
        let coupons = Arc::new(CouponService::new(Arc::new(MemoryCouponStore::new())));
        let balance = Arc::new(BalanceService::new(Arc::new(MemoryBalanceStore::new())));
        let commissions = Arc::new(CommissionService::new(
            Arc::new(MemoryCommissionStore::new()),
            balance.clone(),
            notifier.clone(),
            config.commission.clone(),
        ));
        let trials = Arc::new(TrialService::new(
            Arc::new(MemoryTrialStore::new()),
            users.clone(),
            notifier.clone(),
            config.trial.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            Arc::new(MemoryOrderStore::new()),
            plan_store,
            users.clone(),
            coupons.clone(),
            balance.clone(),
            commissions.clone(),
            trials.clone(),
            notifier,
            config.order.clone(),
        ));

        let state = Self {
            config: Arc::new(config),
            auth: auth.clone(),
            users,
            auth_tokens,
            proxies,
            cache,
            limiter,
            blacklist,
            portal,
            subscriptions,
            plans,
            coupons,
            balance,
            commissions,
            trials,
            orders,
        };
        state.seed_admin().await?;
        Ok(state)
    }

    async fn seed_admin(&self) -> anyhow::Result<()> {
        let auth = &self.config.auth;
        if auth.admin_pass.is_empty() {
            return Ok(());
        }
        if self.users.get_by_username(&auth.admin_user).await?.is_some() {
            return Ok(());
        }
        let hash = self.auth.hash_password(&auth.admin_pass)?;
        self.users
            .create(User {
                id: 0,
                username: auth.admin_user.clone(),
                email: format!("{}@localhost.invalid", auth.admin_user),
                password_hash: hash,
                role: Role::Admin,
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
            })
            .await?;
        tracing::info!(username = %auth.admin_user, "admin account seeded");
        Ok(())
    }
}
