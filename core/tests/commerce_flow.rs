//! End-to-end commerce scenarios: coupons, order lifecycle, commissions

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use vpanel_core::cache::MemoryCache;
use vpanel_core::commerce::{
    BalanceService, CommissionService, CouponService, CreateOrderRequest, OrderService,
    PlanService, TrialService,
};
use vpanel_core::config::{CommissionConfig, OrderConfig, TrialConfig};
use vpanel_core::models::{
    Coupon, CouponType, OrderStatus, Plan, ResetCycle, Role, User,
};
use vpanel_core::notifier::TracingNotifier;
use vpanel_core::store::{
    MemoryBalanceStore, MemoryCommissionStore, MemoryCouponStore, MemoryOrderStore,
    MemoryPlanStore, MemoryTrialStore, MemoryUserStore, UserStore,
};
use vpanel_core::PanelError;

struct Harness {
    users: Arc<MemoryUserStore>,
    plans: Arc<PlanService>,
    coupons: Arc<CouponService>,
    balance: Arc<BalanceService>,
    commissions: Arc<CommissionService>,
    orders: OrderService,
}

fn harness(order_config: OrderConfig, commission_config: CommissionConfig) -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let plan_store = Arc::new(MemoryPlanStore::new());
    let cache = Arc::new(MemoryCache::new("t", 100, StdDuration::from_secs(60)));
    let plans = Arc::new(PlanService::new(
        plan_store.clone(),
        cache,
        BTreeMap::new(),
    ));
    let coupons = Arc::new(CouponService::new(Arc::new(MemoryCouponStore::new())));
    let balance = Arc::new(BalanceService::new(Arc::new(MemoryBalanceStore::new())));
    let notifier = Arc::new(TracingNotifier);
    let commissions = Arc::new(CommissionService::new(
        Arc::new(MemoryCommissionStore::new()),
        balance.clone(),
        notifier.clone(),
        commission_config,
    ));
    let trials = Arc::new(TrialService::new(
        Arc::new(MemoryTrialStore::new()),
        users.clone(),
        notifier.clone(),
        TrialConfig::default(),
    ));
    let orders = OrderService::new(
        Arc::new(MemoryOrderStore::new()),
        plan_store,
        users.clone(),
        coupons.clone(),
        balance.clone(),
        commissions.clone(),
        trials,
        notifier,
        order_config,
    );
    Harness {
        users,
        plans,
        coupons,
        balance,
        commissions,
        orders,
    }
}

async fn seed_user(harness: &Harness, name: &str, inviter_id: Option<u64>) -> User {
    harness
        .users
        .create(User {
            id: 0,
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            role: Role::User,
            enabled: true,
            email_verified: true,
            two_factor_enabled: false,
            expires_at: None,
            traffic_limit: 0,
            traffic_used: 0,
            inviter_id,
            token_version: 0,
            last_login_at: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

async fn seed_plan(harness: &Harness, price: i64) -> Plan {
    harness
        .plans
        .create(Plan {
            id: 0,
            name: "Monthly".to_string(),
            price,
            duration_days: 30,
            traffic_limit: 100 * 1024 * 1024 * 1024,
            plan_type: "standard".to_string(),
            reset_cycle: ResetCycle::Monthly,
            ip_limit: 3,
            is_active: true,
            is_recommended: true,
            group_id: None,
            features: vec![],
            payment_methods: vec!["alipay".to_string()],
            prices: BTreeMap::new(),
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

fn summer_coupon() -> Coupon {
    Coupon {
        id: 0,
        code: "SUMMER".to_string(),
        name: "Summer".to_string(),
        coupon_type: CouponType::Percentage,
        value: 1000,
        min_order_amount: 0,
        max_discount: 500,
        total_limit: 0,
        per_user_limit: 0,
        used_count: 0,
        plan_ids: vec![],
        start_at: None,
        expire_at: None,
        is_active: true,
    }
}

#[tokio::test]
async fn percentage_coupon_discount_is_capped() {
    let harness = harness(OrderConfig::default(), CommissionConfig::default());
    harness.coupons.create(summer_coupon()).await.unwrap();

    let (_, discount) = harness
        .coupons
        .validate("SUMMER", 1, 1, 8000)
        .await
        .unwrap();
    assert_eq!(discount, 500);

    let (_, discount) = harness
        .coupons
        .validate("SUMMER", 1, 1, 3000)
        .await
        .unwrap();
    assert_eq!(discount, 300);
}

#[tokio::test]
async fn order_lifecycle_with_coupon_and_balance() {
    let harness = harness(OrderConfig::default(), CommissionConfig::default());
    let user = seed_user(&harness, "buyer", None).await;
    let plan = seed_plan(&harness, 8000).await;
    harness.coupons.create(summer_coupon()).await.unwrap();
    harness.balance.recharge(user.id, 1000, "admin").await.unwrap();

    let order = harness
        .orders
        .create(CreateOrderRequest {
            user_id: user.id,
            plan_id: plan.id,
            coupon_code: Some("SUMMER".to_string()),
            balance_to_use: 1000,
        })
        .await
        .unwrap();

    assert!(order.order_no.starts_with("ORD-"));
    assert_eq!(order.original_amount, 8000);
    assert_eq!(order.discount_amount, 500);
    assert_eq!(order.balance_used, 1000);
    assert_eq!(order.pay_amount, 6500);
    assert_eq!(order.status, OrderStatus::Pending);
    // The wallet part is reserved immediately.
    assert_eq!(harness.balance.balance(user.id).await.unwrap(), 0);

    let order = harness
        .orders
        .mark_paid(&order.order_no, "alipay", "PAY-123")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    let order = harness.orders.complete(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);

    // Provisioning landed on the account.
    let user = harness.users.get(user.id).await.unwrap().unwrap();
    assert!(user.expires_at.is_some());
    assert_eq!(user.traffic_limit, plan.traffic_limit);
}

#[tokio::test]
async fn expired_pending_order_is_swept_and_payment_conflicts() {
    // Zero-minute expiry: the order is born already past its deadline.
    let harness = harness(
        OrderConfig { expiry_minutes: 0 },
        CommissionConfig::default(),
    );
    let user = seed_user(&harness, "buyer", None).await;
    let plan = seed_plan(&harness, 5000).await;
    harness.balance.recharge(user.id, 500, "admin").await.unwrap();

    let order = harness
        .orders
        .create(CreateOrderRequest {
            user_id: user.id,
            plan_id: plan.id,
            coupon_code: None,
            balance_to_use: 500,
        })
        .await
        .unwrap();
    assert_eq!(harness.balance.balance(user.id).await.unwrap(), 0);

    assert_eq!(harness.orders.expire_pending().await.unwrap(), 1);
    let swept = harness.orders.get(order.id).await.unwrap();
    assert_eq!(swept.status, OrderStatus::Cancelled);
    // Reserved balance flowed back.
    assert_eq!(harness.balance.balance(user.id).await.unwrap(), 500);

    // Late payment callback hits a terminal order.
    let err = harness
        .orders
        .mark_paid(&order.order_no, "alipay", "PAY-LATE")
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::Conflict(_)));

    // The sweep is idempotent.
    assert_eq!(harness.orders.expire_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn commission_settles_after_delay_and_credits_referrer() {
    let harness = harness(
        OrderConfig::default(),
        CommissionConfig {
            enabled: true,
            rate_bps: 1000,
            settle_days: 0,
        },
    );
    let referrer = seed_user(&harness, "referrer", None).await;
    let buyer = seed_user(&harness, "buyer", Some(referrer.id)).await;
    let plan = seed_plan(&harness, 10_000).await;

    let order = harness
        .orders
        .create(CreateOrderRequest {
            user_id: buyer.id,
            plan_id: plan.id,
            coupon_code: None,
            balance_to_use: 0,
        })
        .await
        .unwrap();
    harness
        .orders
        .mark_paid(&order.order_no, "alipay", "PAY-1")
        .await
        .unwrap();

    // Pending commission exists but the balance is untouched.
    assert_eq!(harness.balance.balance(referrer.id).await.unwrap(), 0);

    // Settlement promotes it and credits the referrer.
    assert_eq!(harness.commissions.confirm_pending().await.unwrap(), 1);
    assert_eq!(harness.balance.balance(referrer.id).await.unwrap(), 1000);

    let (txs, _) = harness
        .balance
        .history(referrer.id, vpanel_core::store::Page::default())
        .await
        .unwrap();
    assert_eq!(txs[0].amount, 1000);
    assert_eq!(txs[0].balance, 1000);
}

#[tokio::test]
async fn refund_cancels_pending_commission_and_credits_buyer() {
    let harness = harness(
        OrderConfig::default(),
        CommissionConfig {
            enabled: true,
            rate_bps: 1000,
            settle_days: 7,
        },
    );
    let referrer = seed_user(&harness, "referrer", None).await;
    let buyer = seed_user(&harness, "buyer", Some(referrer.id)).await;
    let plan = seed_plan(&harness, 10_000).await;

    let order = harness
        .orders
        .create(CreateOrderRequest {
            user_id: buyer.id,
            plan_id: plan.id,
            coupon_code: None,
            balance_to_use: 0,
        })
        .await
        .unwrap();
    let order = harness
        .orders
        .mark_paid(&order.order_no, "alipay", "PAY-1")
        .await
        .unwrap();
    let order = harness.orders.complete(order.id).await.unwrap();

    let refunded = harness.orders.refund(order.id).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    // The buyer got the paid amount back on their balance.
    assert_eq!(harness.balance.balance(buyer.id).await.unwrap(), 10_000);
    // The pending commission never settles.
    assert_eq!(harness.commissions.confirm_pending().await.unwrap(), 0);
    assert_eq!(harness.balance.balance(referrer.id).await.unwrap(), 0);

    // Refunded is terminal.
    assert!(harness.orders.refund(order.id).await.is_err());
    assert!(harness
        .orders
        .update_status(order.id, OrderStatus::Completed)
        .await
        .is_err());
}

#[tokio::test]
async fn cancel_only_from_pending() {
    let harness = harness(OrderConfig::default(), CommissionConfig::default());
    let user = seed_user(&harness, "buyer", None).await;
    let plan = seed_plan(&harness, 1000).await;

    let order = harness
        .orders
        .create(CreateOrderRequest {
            user_id: user.id,
            plan_id: plan.id,
            coupon_code: None,
            balance_to_use: 0,
        })
        .await
        .unwrap();
    harness
        .orders
        .mark_paid(&order.order_no, "alipay", "P")
        .await
        .unwrap();
    assert!(matches!(
        harness.orders.cancel(order.id).await,
        Err(PanelError::Conflict(_))
    ));
}
