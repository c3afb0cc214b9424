//! Referral commissions with deferred settlement
//!
//! A paid order by an invited user records a `pending` commission for the
//! inviter. Pending rows older than the settlement delay are promoted to
//! `confirmed` by a periodic sweep, which credits the referrer's balance;
//! a refund before settlement cancels them instead.

use super::balance::BalanceService;
use crate::config::CommissionConfig;
use crate::error::Result;
use crate::models::{Commission, CommissionStatus, Order};
use crate::notifier::{Notifier, NotifyEvent};
use crate::store::{CommissionStore, Page};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Commission engine
pub struct CommissionService {
    commissions: Arc<dyn CommissionStore>,
    balance: Arc<BalanceService>,
    notifier: Arc<dyn Notifier>,
    config: CommissionConfig,
}

impl CommissionService {
    pub fn new(
        commissions: Arc<dyn CommissionStore>,
        balance: Arc<BalanceService>,
        notifier: Arc<dyn Notifier>,
        config: CommissionConfig,
    ) -> Self {
        Self {
            commissions,
            balance,
            notifier,
            config,
        }
    }

    /// Commission for an order amount; 0 when the feature is disabled.
    #[must_use]
    pub fn calculate(&self, order_amount: i64) -> i64 {
        if !self.config.enabled {
            return 0;
        }
        order_amount * i64::from(self.config.rate_bps) / 10000
    }

    /// Record a pending commission for the inviter of a paid order.
    /// Returns `None` when the feature is off or the amount rounds to 0.
    pub async fn create_for_order(
        &self,
        order: &Order,
        inviter_id: u64,
    ) -> Result<Option<Commission>> {
        let amount = self.calculate(order.pay_amount);
        if amount <= 0 {
            return Ok(None);
        }
        let commission = self
            .commissions
            .create(Commission {
                id: 0,
                user_id: inviter_id,
                from_user_id: order.user_id,
                order_id: order.id,
                amount,
                rate: self.config.rate_bps,
                level: 1,
                status: CommissionStatus::Pending,
                confirm_at: None,
                created_at: Utc::now(),
            })
            .await?;
        info!(
            commission_id = commission.id,
            inviter_id, order_id = order.id, amount, "commission recorded"
        );
        Ok(Some(commission))
    }

    /// Promote pending commissions past the settlement delay to confirmed
    /// and credit each beneficiary. Returns the number settled.
    ///
    /// The sweep is idempotent: rows are flipped before the credit, and a
    /// crash between the two leaves an already-confirmed row the next run
    /// skips.
    pub async fn confirm_pending(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.settle_days);
        let pending = self.commissions.list_pending_before(cutoff).await?;
        let mut settled = 0;
        for mut commission in pending {
            commission.status = CommissionStatus::Confirmed;
            commission.confirm_at = Some(Utc::now());
            self.commissions.update(&commission).await?;
            self.balance
                .add_commission(
                    commission.user_id,
                    commission.amount,
                    Some(commission.order_id),
                )
                .await?;
            self.notifier
                .notify(NotifyEvent::CommissionConfirmed {
                    user_id: commission.user_id,
                    order_id: commission.order_id,
                    amount: commission.amount,
                })
                .await;
            settled += 1;
        }
        if settled > 0 {
            info!(settled, "commissions settled");
        }
        Ok(settled)
    }

    /// Cancel every still-pending commission of `order_id` (refund path).
    /// Returns the number cancelled.
    pub async fn cancel_by_order(&self, order_id: u64) -> Result<usize> {
        let pending = self
            .commissions
            .list_by_order(order_id, Some(CommissionStatus::Pending))
            .await?;
        let cancelled = pending.len();
        for mut commission in pending {
            commission.status = CommissionStatus::Cancelled;
            self.commissions.update(&commission).await?;
        }
        Ok(cancelled)
    }

    pub async fn list_for_user(
        &self,
        user_id: u64,
        page: Page,
    ) -> Result<(Vec<Commission>, u64)> {
        self.commissions.list_by_user(user_id, page).await
    }
}
