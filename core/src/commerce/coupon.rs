//! Coupon validation, discount calculation and usage accounting
//!
//! Percentage values use the `value/10000` unit everywhere: 1000 = 10%.
//! That unit is validated at construction so a mis-scaled value cannot
//! reach the discount math.

use crate::error::{PanelError, Result};
use crate::models::{Coupon, CouponType, CouponUsage};
use crate::store::CouponStore;
use crate::tokens::generate_code_block;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Coupon engine over the store
pub struct CouponService {
    coupons: Arc<dyn CouponStore>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponStore>) -> Self {
        Self { coupons }
    }

    /// Create a coupon; codes are stored uppercase.
    pub async fn create(&self, mut coupon: Coupon) -> Result<Coupon> {
        coupon.code = coupon.code.trim().to_uppercase();
        Self::validate_shape(&coupon)?;
        self.coupons.create(coupon).await
    }

    /// Produce `count` coupons sharing `template`'s terms with unique
    /// `<PREFIX>-<8-hex-upper>` codes.
    pub async fn create_batch(
        &self,
        template: &Coupon,
        prefix: &str,
        count: usize,
    ) -> Result<Vec<Coupon>> {
        Self::validate_shape(template)?;
        let mut created = Vec::with_capacity(count);
        for code in generate_batch_codes(prefix, count) {
            let mut coupon = template.clone();
            coupon.id = 0;
            coupon.code = code;
            coupon.used_count = 0;
            created.push(self.coupons.create(coupon).await?);
        }
        Ok(created)
    }

    /// Validate `code` for one prospective order and return the discount.
    ///
    /// Rejection order: inactive, not yet started, expired, total limit,
    /// per-user limit, order below minimum, plan restriction.
    pub async fn validate(
        &self,
        code: &str,
        user_id: u64,
        plan_id: u64,
        order_amount: i64,
    ) -> Result<(Coupon, i64)> {
        let now = Utc::now();
        let coupon = self
            .coupons
            .get_by_code(&code.trim().to_uppercase())
            .await?
            .ok_or_else(|| PanelError::not_found("coupon"))?;

        if !coupon.is_active {
            return Err(PanelError::validation("coupon is not active"));
        }
        if coupon.start_at.is_some_and(|at| now < at) {
            return Err(PanelError::validation("coupon is not yet valid"));
        }
        if coupon.expire_at.is_some_and(|at| at <= now) {
            return Err(PanelError::validation("coupon has expired"));
        }
        if coupon.total_limit > 0 && coupon.used_count >= coupon.total_limit {
            return Err(PanelError::validation("coupon is used up"));
        }
        if coupon.per_user_limit > 0 {
            let used = self
                .coupons
                .count_usages_by_user(coupon.id, user_id)
                .await?;
            if used >= coupon.per_user_limit {
                return Err(PanelError::validation("coupon usage limit reached"));
            }
        }
        if coupon.min_order_amount > 0 && order_amount < coupon.min_order_amount {
            return Err(PanelError::validation("order amount below coupon minimum"));
        }
        if !coupon.plan_ids.is_empty() && !coupon.plan_ids.contains(&plan_id) {
            return Err(PanelError::validation("coupon not valid for this plan"));
        }

        let discount = calculate_discount(&coupon, order_amount);
        Ok((coupon, discount))
    }

    /// Record a redemption: appends the usage row and bumps the counter
    /// atomically.
    pub async fn redeem(
        &self,
        coupon_id: u64,
        user_id: u64,
        order_id: u64,
        discount: i64,
    ) -> Result<CouponUsage> {
        self.coupons
            .record_usage(CouponUsage {
                id: 0,
                coupon_id,
                user_id,
                order_id,
                discount,
                used_at: Utc::now(),
            })
            .await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        self.coupons.get_by_code(&code.trim().to_uppercase()).await
    }

    fn validate_shape(coupon: &Coupon) -> Result<()> {
        match coupon.coupon_type {
            CouponType::Fixed => {
                if coupon.value <= 0 {
                    return Err(PanelError::validation(
                        "fixed coupon value must be positive",
                    ));
                }
            }
            CouponType::Percentage => {
                // value/10000 unit: 10000 is 100% off.
                if coupon.value <= 0 || coupon.value > 10000 {
                    return Err(PanelError::validation(
                        "percentage coupon value must be in 1..=10000",
                    ));
                }
            }
        }
        if coupon.min_order_amount < 0 || coupon.max_discount < 0 {
            return Err(PanelError::validation("coupon amounts must not be negative"));
        }
        Ok(())
    }
}

/// Pure discount calculation.
///
/// Fixed: `min(value, orderAmount)`. Percentage: `orderAmount * value /
/// 10000`, capped by `max_discount` when set, never above the order.
#[must_use]
pub fn calculate_discount(coupon: &Coupon, order_amount: i64) -> i64 {
    let raw = match coupon.coupon_type {
        CouponType::Fixed => coupon.value,
        CouponType::Percentage => {
            let mut d = order_amount * coupon.value / 10000;
            if coupon.max_discount > 0 {
                d = d.min(coupon.max_discount);
            }
            d
        }
    };
    raw.clamp(0, order_amount)
}

/// Unique `<PREFIX>-<8-hex-upper>` codes, uniqueness enforced within the
/// batch.
#[must_use]
pub fn generate_batch_codes(prefix: &str, count: usize) -> Vec<String> {
    let prefix = prefix.trim().to_uppercase();
    let mut seen = HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);
    while codes.len() < count {
        let code = format!("{prefix}-{}", generate_code_block(8));
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}
