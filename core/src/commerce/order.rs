//! Order creation, status machine and sweeps
//!
//! An order walks `pending -> paid -> completed`, with `cancelled` and
//! `refunded` as terminal exits. Transitions are optimistic against the
//! store row, so two actors racing the same order fail cleanly with
//! `Conflict`. Refund is three independent idempotent steps (status,
//! commission cancel, balance credit); there is no cross-table
//! transaction to roll back.

use super::balance::BalanceService;
use super::commission::CommissionService;
use super::coupon::CouponService;
use super::trial::TrialService;
use crate::config::OrderConfig;
use crate::error::{PanelError, Result};
use crate::models::{Order, OrderStatus, Plan, User};
use crate::notifier::{Notifier, NotifyEvent};
use crate::store::{OrderPatch, OrderStore, Page, PlanStore, UserStore};
use crate::tokens::generate_code_block;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Input of [`OrderService::create`]
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: u64,
    pub plan_id: u64,
    pub coupon_code: Option<String>,
    /// Wallet balance the buyer wants applied, cents
    pub balance_to_use: i64,
}

/// Order engine
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    plans: Arc<dyn PlanStore>,
    users: Arc<dyn UserStore>,
    coupons: Arc<CouponService>,
    balance: Arc<BalanceService>,
    commissions: Arc<CommissionService>,
    trials: Arc<TrialService>,
    notifier: Arc<dyn Notifier>,
    config: OrderConfig,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        plans: Arc<dyn PlanStore>,
        users: Arc<dyn UserStore>,
        coupons: Arc<CouponService>,
        balance: Arc<BalanceService>,
        commissions: Arc<CommissionService>,
        trials: Arc<TrialService>,
        notifier: Arc<dyn Notifier>,
        config: OrderConfig,
    ) -> Self {
        Self {
            orders,
            plans,
            users,
            coupons,
            balance,
            commissions,
            trials,
            notifier,
            config,
        }
    }

    /// Create a `pending` order: price the plan, apply the coupon, reserve
    /// the requested wallet balance.
    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order> {
        let plan = self
            .plans
            .get(request.plan_id)
            .await?
            .ok_or_else(|| PanelError::not_found("plan"))?;
        if !plan.is_active {
            return Err(PanelError::validation("plan is not available"));
        }
        let user = self
            .users
            .get(request.user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("user"))?;

        let original_amount = plan.price;
        let (coupon, discount_amount) = match &request.coupon_code {
            Some(code) => {
                let (coupon, discount) = self
                    .coupons
                    .validate(code, user.id, plan.id, original_amount)
                    .await?;
                (Some(coupon), discount)
            }
            None => (None, 0),
        };

        if request.balance_to_use < 0 {
            return Err(PanelError::validation("balance_to_use must not be negative"));
        }
        let balance_used = request
            .balance_to_use
            .min(original_amount - discount_amount);
        let pay_amount = (original_amount - discount_amount - balance_used).max(0);

        let now = Utc::now();
        let order = self
            .insert_with_fresh_order_no(Order {
                id: 0,
                order_no: String::new(),
                user_id: user.id,
                plan_id: plan.id,
                coupon_id: coupon.as_ref().map(|c| c.id),
                original_amount,
                discount_amount,
                balance_used,
                pay_amount,
                status: OrderStatus::Pending,
                payment_method: None,
                payment_no: None,
                paid_at: None,
                expired_at: now + Duration::minutes(self.config.expiry_minutes),
                created_at: now,
            })
            .await?;

        // Reserve the wallet part up front; it flows back on cancel.
        if balance_used > 0 {
            if let Err(err) = self
                .balance
                .deduct(
                    user.id,
                    balance_used,
                    Some(order.id),
                    &format!("order {}", order.order_no),
                    "user",
                )
                .await
            {
                let _ = self
                    .orders
                    .transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled, None)
                    .await;
                return Err(err);
            }
        }
        if let Some(coupon) = &coupon {
            self.coupons
                .redeem(coupon.id, user.id, order.id, discount_amount)
                .await?;
        }

        info!(
            order_no = %order.order_no,
            user_id = user.id,
            pay_amount,
            "order created"
        );
        Ok(order)
    }

    pub async fn get(&self, id: u64) -> Result<Order> {
        self.orders
            .get(id)
            .await?
            .ok_or_else(|| PanelError::not_found("order"))
    }

    pub async fn get_by_order_no(&self, order_no: &str) -> Result<Order> {
        self.orders
            .get_by_order_no(order_no)
            .await?
            .ok_or_else(|| PanelError::not_found("order"))
    }

    pub async fn list_for_user(
        &self,
        user_id: u64,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<Order>, u64)> {
        self.orders.list_by_user(user_id, status, page).await
    }

    /// Cancel a pending order and release its reserved balance.
    pub async fn cancel(&self, id: u64) -> Result<Order> {
        let order = self
            .orders
            .transition(id, OrderStatus::Pending, OrderStatus::Cancelled, None)
            .await?;
        self.release_reserved_balance(&order).await;
        info!(order_no = %order.order_no, "order cancelled");
        Ok(order)
    }

    /// Payment-channel callback: mark a pending, unexpired order paid and
    /// record the pending referral commission.
    pub async fn mark_paid(
        &self,
        order_no: &str,
        payment_method: &str,
        payment_no: &str,
    ) -> Result<Order> {
        let order = self.get_by_order_no(order_no).await?;
        if order.status != OrderStatus::Pending {
            return Err(PanelError::conflict(format!(
                "order {order_no} is {}",
                order.status.as_str()
            )));
        }
        let now = Utc::now();
        if now > order.expired_at {
            return Err(PanelError::conflict("order has expired"));
        }
        let order = self
            .orders
            .transition(
                order.id,
                OrderStatus::Pending,
                OrderStatus::Paid,
                Some(OrderPatch {
                    payment_method: Some(payment_method.to_string()),
                    payment_no: Some(payment_no.to_string()),
                    paid_at: Some(now),
                }),
            )
            .await?;

        if let Some(inviter_id) = self.inviter_of(order.user_id).await? {
            self.commissions
                .create_for_order(&order, inviter_id)
                .await?;
        }
        self.notifier
            .notify(NotifyEvent::OrderPaid {
                user_id: order.user_id,
                order_no: order.order_no.clone(),
                pay_amount: order.pay_amount,
            })
            .await;
        info!(order_no = %order.order_no, "order paid");
        Ok(order)
    }

    /// Provision the plan onto the account and close the order.
    pub async fn complete(&self, id: u64) -> Result<Order> {
        let order = self
            .orders
            .transition(id, OrderStatus::Paid, OrderStatus::Completed, None)
            .await?;
        let plan = self
            .plans
            .get(order.plan_id)
            .await?
            .ok_or_else(|| PanelError::not_found("plan"))?;
        let mut user = self
            .users
            .get(order.user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("user"))?;
        provision_plan(&mut user, &plan);
        self.users.update(&user).await?;
        // A purchased plan supersedes a running trial.
        self.trials.mark_converted(user.id).await?;
        info!(order_no = %order.order_no, user_id = user.id, "order completed");
        Ok(order)
    }

    /// Refund a paid or completed order: status first, then commission
    /// cancel, then the balance credit. Consumed traffic and time are not
    /// clawed back.
    pub async fn refund(&self, id: u64) -> Result<Order> {
        let current = self.get(id).await?;
        let order = match current.status {
            OrderStatus::Paid => {
                self.orders
                    .transition(id, OrderStatus::Paid, OrderStatus::Refunded, None)
                    .await?
            }
            OrderStatus::Completed => {
                self.orders
                    .transition(id, OrderStatus::Completed, OrderStatus::Refunded, None)
                    .await?
            }
            other => {
                return Err(PanelError::conflict(format!(
                    "order {} is {}",
                    current.order_no,
                    other.as_str()
                )))
            }
        };

        let cancelled = self.commissions.cancel_by_order(order.id).await?;
        if cancelled > 0 {
            info!(order_no = %order.order_no, cancelled, "pending commissions cancelled");
        }
        let credit = order.pay_amount + order.balance_used;
        if credit > 0 {
            self.balance
                .refund(
                    order.user_id,
                    credit,
                    Some(order.id),
                    &format!("refund of order {}", order.order_no),
                )
                .await?;
        }
        info!(order_no = %order.order_no, credit, "order refunded");
        Ok(order)
    }

    /// Generic guarded transition for the admin surface.
    pub async fn update_status(&self, id: u64, to: OrderStatus) -> Result<Order> {
        let order = self.get(id).await?;
        if !order.status.can_transition_to(to) {
            return Err(PanelError::conflict(format!(
                "illegal transition {} -> {}",
                order.status.as_str(),
                to.as_str()
            )));
        }
        match to {
            OrderStatus::Cancelled => self.cancel(id).await,
            // A manual paid mark goes through the same flow as the
            // payment callback, minus a channel reference.
            OrderStatus::Paid => self.mark_paid(&order.order_no, "manual", "").await,
            OrderStatus::Completed => self.complete(id).await,
            OrderStatus::Refunded => self.refund(id).await,
            OrderStatus::Pending => Err(PanelError::conflict("cannot return to pending")),
        }
    }

    /// Sweep: cancel every pending order past its expiry. Returns the
    /// number cancelled.
    pub async fn expire_pending(&self) -> Result<usize> {
        let expired = self.orders.list_pending_expired(Utc::now()).await?;
        let mut cancelled = 0;
        for order in expired {
            match self
                .orders
                .transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled, None)
                .await
            {
                Ok(order) => {
                    self.release_reserved_balance(&order).await;
                    cancelled += 1;
                }
                // Lost the race against a payment callback; skip.
                Err(PanelError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        if cancelled > 0 {
            info!(cancelled, "expired pending orders cancelled");
        }
        Ok(cancelled)
    }

    async fn release_reserved_balance(&self, order: &Order) {
        if order.balance_used == 0 {
            return;
        }
        if let Err(err) = self
            .balance
            .refund(
                order.user_id,
                order.balance_used,
                Some(order.id),
                &format!("reservation release for order {}", order.order_no),
            )
            .await
        {
            warn!(order_no = %order.order_no, error = %err, "balance release failed");
        }
    }

    async fn inviter_of(&self, user_id: u64) -> Result<Option<u64>> {
        Ok(self
            .users
            .get(user_id)
            .await?
            .and_then(|user| user.inviter_id))
    }

    async fn insert_with_fresh_order_no(&self, mut order: Order) -> Result<Order> {
        for _ in 0..3 {
            order.order_no = generate_order_no(order.created_at);
            match self.orders.create(order.clone()).await {
                Ok(order) => return Ok(order),
                Err(PanelError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Err(PanelError::internal("could not allocate order number"))
    }
}

/// `ORD-YYYYMMDD-XXXXXXXX` with a lowercase hex tail.
#[must_use]
pub fn generate_order_no(at: DateTime<Utc>) -> String {
    format!(
        "ORD-{}-{}",
        at.format("%Y%m%d"),
        generate_code_block(8).to_lowercase()
    )
}

/// Stack the purchased plan onto the account: duration extends from the
/// later of now and the current expiry, traffic adds on top.
fn provision_plan(user: &mut User, plan: &Plan) {
    let now = Utc::now();
    if plan.duration_days > 0 {
        let base = user.expires_at.filter(|at| *at > now).unwrap_or(now);
        user.expires_at = Some(base + Duration::days(plan.duration_days));
    }
    if plan.traffic_limit > 0 {
        user.traffic_limit += plan.traffic_limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_no_shape() {
        let at = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let order_no = generate_order_no(at);
        assert!(order_no.starts_with("ORD-20260101-"));
        let tail = order_no.rsplit('-').next().unwrap();
        assert_eq!(tail.len(), 8);
        assert!(tail
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_provision_extends_from_later_of_now_and_expiry() {
        let now = Utc::now();
        let plan = Plan {
            id: 1,
            name: "Monthly".to_string(),
            price: 1000,
            duration_days: 30,
            traffic_limit: 50,
            plan_type: "standard".to_string(),
            reset_cycle: crate::models::ResetCycle::None,
            ip_limit: 0,
            is_active: true,
            is_recommended: false,
            group_id: None,
            features: vec![],
            payment_methods: vec![],
            prices: Default::default(),
            created_at: now,
        };
        let mut user = crate::models::User {
            id: 1,
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            password_hash: String::new(),
            role: crate::models::Role::User,
            enabled: true,
            email_verified: true,
            two_factor_enabled: false,
            expires_at: Some(now - Duration::days(10)),
            traffic_limit: 10,
            traffic_used: 0,
            inviter_id: None,
            token_version: 0,
            last_login_at: None,
            created_at: now,
        };
        // Lapsed expiry restarts from now, not from the past date.
        provision_plan(&mut user, &plan);
        let expires = user.expires_at.unwrap();
        assert!(expires > now + Duration::days(29));
        assert!(expires <= now + Duration::days(31));
        assert_eq!(user.traffic_limit, 60);

        // A live expiry stacks on top.
        provision_plan(&mut user, &plan);
        assert!(user.expires_at.unwrap() > now + Duration::days(59));
    }
}
