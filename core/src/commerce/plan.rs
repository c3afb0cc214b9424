//! Plan catalogue
//!
//! Read-mostly: the active listing is served through the cache and
//! invalidated on every write. Prices are cents in the base currency with
//! an optional per-currency overlay; lookup falls back to converting the
//! base price with the configured rate table.

use crate::cache::Cache;
use crate::error::{PanelError, Result};
use crate::models::{Plan, PlanGroup};
use crate::store::PlanStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const ACTIVE_PLANS_KEY: &str = "plans:active";

/// Plan catalogue over the store and cache
pub struct PlanService {
    plans: Arc<dyn PlanStore>,
    cache: Arc<dyn Cache>,
    /// Units of `currency` per one unit of the base currency
    rates: BTreeMap<String, f64>,
}

impl PlanService {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        cache: Arc<dyn Cache>,
        rates: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            plans,
            cache,
            rates,
        }
    }

    /// Create a plan after validating its money and duration fields.
    pub async fn create(&self, plan: Plan) -> Result<Plan> {
        Self::validate(&plan)?;
        let plan = self.plans.create(plan).await?;
        self.invalidate().await;
        Ok(plan)
    }

    pub async fn update(&self, plan: &Plan) -> Result<()> {
        Self::validate(plan)?;
        self.plans.update(plan).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn get(&self, id: u64) -> Result<Plan> {
        self.plans
            .get(id)
            .await?
            .ok_or_else(|| PanelError::not_found("plan"))
    }

    /// Active plans, cache-through.
    pub async fn list_active(&self) -> Result<Vec<Plan>> {
        if let Ok(Some(raw)) = self.cache.get(ACTIVE_PLANS_KEY).await {
            if let Ok(plans) = serde_json::from_str::<Vec<Plan>>(&raw) {
                return Ok(plans);
            }
        }
        let plans = self.plans.list(true).await?;
        if let Ok(raw) = serde_json::to_string(&plans) {
            if let Err(err) = self.cache.set(ACTIVE_PLANS_KEY, &raw, None).await {
                debug!(error = %err, "plan cache write failed");
            }
        }
        Ok(plans)
    }

    /// All plans including inactive, for the admin surface.
    pub async fn list_all(&self) -> Result<Vec<Plan>> {
        self.plans.list(false).await
    }

    pub async fn create_group(&self, group: PlanGroup) -> Result<PlanGroup> {
        self.plans.create_group(group).await
    }

    pub async fn list_groups(&self) -> Result<Vec<PlanGroup>> {
        self.plans.list_groups().await
    }

    /// Price of `plan` in `currency`: the explicit overlay when present,
    /// otherwise the base price converted with the rate table, otherwise
    /// the base price itself.
    #[must_use]
    pub fn price_in(&self, plan: &Plan, currency: &str) -> i64 {
        if let Some(price) = plan.prices.get(currency) {
            return *price;
        }
        match self.rates.get(currency) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            Some(rate) => (plan.price as f64 * rate).round() as i64,
            None => plan.price,
        }
    }

    fn validate(plan: &Plan) -> Result<()> {
        if plan.name.trim().is_empty() {
            return Err(PanelError::validation("plan name must not be empty"));
        }
        if plan.price < 0 {
            return Err(PanelError::validation("plan price must not be negative"));
        }
        if plan.duration_days < 0 {
            return Err(PanelError::validation("plan duration must not be negative"));
        }
        Ok(())
    }

    async fn invalidate(&self) {
        if let Err(err) = self.cache.invalidate_pattern("plans:*").await {
            debug!(error = %err, "plan cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::ResetCycle;
    use crate::store::MemoryPlanStore;
    use chrono::Utc;
    use std::time::Duration;

    fn plan(name: &str, price: i64, duration_days: i64) -> Plan {
        Plan {
            id: 0,
            name: name.to_string(),
            price,
            duration_days,
            traffic_limit: 100 * 1024 * 1024 * 1024,
            plan_type: "standard".to_string(),
            reset_cycle: ResetCycle::Monthly,
            ip_limit: 3,
            is_active: true,
            is_recommended: false,
            group_id: None,
            features: vec![],
            payment_methods: vec!["alipay".to_string()],
            prices: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    fn service() -> PlanService {
        let mut rates = BTreeMap::new();
        rates.insert("usd".to_string(), 0.14);
        PlanService::new(
            Arc::new(MemoryPlanStore::new()),
            Arc::new(MemoryCache::new("t", 100, Duration::from_secs(60))),
            rates,
        )
    }

    #[tokio::test]
    async fn test_listing_reflects_writes_through_cache() {
        let service = service();
        let created = service.create(plan("Monthly", 1500, 30)).await.unwrap();
        assert_eq!(service.list_active().await.unwrap().len(), 1);

        // Deactivate; the cached listing must not serve the stale row.
        let mut updated = created;
        updated.is_active = false;
        service.update(&updated).await.unwrap();
        assert!(service.list_active().await.unwrap().is_empty());
        assert_eq!(service.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_price_overlay_and_conversion() {
        let service = service();
        let mut p = plan("Monthly", 1000, 30);
        p.prices.insert("eur".to_string(), 130);
        let p = service.create(p).await.unwrap();

        // Explicit overlay wins
        assert_eq!(service.price_in(&p, "eur"), 130);
        // Known rate converts the base price
        assert_eq!(service.price_in(&p, "usd"), 140);
        // Unknown currency falls back to base
        assert_eq!(service.price_in(&p, "xxx"), 1000);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_plans() {
        let service = service();
        assert!(service.create(plan("", 100, 30)).await.is_err());
        assert!(service.create(plan("x", -1, 30)).await.is_err());
        assert!(service.create(plan("x", 100, -1)).await.is_err());
    }
}
