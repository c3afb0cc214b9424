//! One-per-user trial lifecycle
//!
//! A user gets at most one trial row forever; any existing row, whatever
//! its status, blocks another activation. The store's unique index backs
//! the service-level check against races.

use crate::config::TrialConfig;
use crate::error::{PanelError, Result};
use crate::models::{Trial, TrialStatus};
use crate::notifier::{Notifier, NotifyEvent};
use crate::store::{TrialStore, UserStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Trial engine
pub struct TrialService {
    trials: Arc<dyn TrialStore>,
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn Notifier>,
    config: TrialConfig,
}

impl TrialService {
    pub fn new(
        trials: Arc<dyn TrialStore>,
        users: Arc<dyn UserStore>,
        notifier: Arc<dyn Notifier>,
        config: TrialConfig,
    ) -> Self {
        Self {
            trials,
            users,
            notifier,
            config,
        }
    }

    /// True while any trial row exists for the user, regardless of status.
    pub async fn has_used_trial(&self, user_id: u64) -> Result<bool> {
        Ok(self.trials.get_by_user(user_id).await?.is_some())
    }

    /// Start the user's one free trial and provision the account from the
    /// trial config where it has no allowance of its own.
    pub async fn activate(&self, user_id: u64) -> Result<Trial> {
        if !self.config.enabled {
            return Err(PanelError::forbidden("trial is disabled"));
        }
        if self.has_used_trial(user_id).await? {
            return Err(PanelError::conflict("trial already used"));
        }
        let mut user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("user"))?;
        if self.config.require_email_verify && !user.email_verified {
            return Err(PanelError::forbidden("email not verified"));
        }

        let now = Utc::now();
        let expire_at = now + Duration::days(self.config.duration_days);
        let trial = self
            .trials
            .create(Trial {
                id: 0,
                user_id,
                status: TrialStatus::Active,
                start_at: now,
                expire_at,
                traffic_used: 0,
                converted_at: None,
            })
            .await?;

        let mut provisioned = false;
        if user.expires_at.is_none() {
            user.expires_at = Some(expire_at);
            provisioned = true;
        }
        if user.traffic_limit == 0 && self.config.traffic_limit > 0 {
            user.traffic_limit = self.config.traffic_limit;
            provisioned = true;
        }
        if provisioned {
            self.users.update(&user).await?;
        }

        info!(user_id, "trial activated");
        self.notifier
            .notify(NotifyEvent::TrialActivated { user_id })
            .await;
        Ok(trial)
    }

    /// Sweep active trials past their expiry. Returns the number expired.
    pub async fn expire_trials(&self) -> Result<usize> {
        let expired = self.trials.list_active_expired(Utc::now()).await?;
        let count = expired.len();
        for mut trial in expired {
            trial.status = TrialStatus::Expired;
            self.trials.update(&trial).await?;
        }
        if count > 0 {
            info!(count, "trials expired");
        }
        Ok(count)
    }

    /// Flip an active trial to converted when the user buys a plan.
    pub async fn mark_converted(&self, user_id: u64) -> Result<()> {
        let Some(mut trial) = self.trials.get_by_user(user_id).await? else {
            return Ok(());
        };
        if trial.status != TrialStatus::Active {
            return Ok(());
        }
        trial.status = TrialStatus::Converted;
        trial.converted_at = Some(Utc::now());
        self.trials.update(&trial).await
    }

    /// Account-deletion cascade: drop the user's trial row.
    pub async fn remove_for_user(&self, user_id: u64) -> Result<()> {
        self.trials.delete_by_user(user_id).await
    }
}
