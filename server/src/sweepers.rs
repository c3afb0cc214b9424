//! Background sweepers
//!
//! Independent periodic tasks sharing the server's shutdown channel:
//! rate-limit eviction, blacklist eviction, order expiration, trial
//! expiration and commission settlement. Each tick is idempotent, so a
//! missed or repeated run is harmless.

use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(60);
const BLACKLIST_SWEEP: Duration = Duration::from_secs(15 * 60);
const ORDER_SWEEP: Duration = Duration::from_secs(60);
const TRIAL_SWEEP: Duration = Duration::from_secs(60 * 60);
const COMMISSION_SWEEP: Duration = Duration::from_secs(60 * 60);

/// Spawn all sweepers; they stop when `shutdown` flips to `true`.
pub fn spawn(state: AppState, shutdown: watch::Receiver<bool>) {
    spawn_loop(shutdown.clone(), RATE_LIMIT_SWEEP, {
        let state = state.clone();
        move || {
            let evicted = state.limiter.cleanup();
            if evicted > 0 {
                debug!(evicted, "rate limiter entries evicted");
            }
            async { Ok(()) }
        }
    });

    spawn_loop(shutdown.clone(), BLACKLIST_SWEEP, {
        let state = state.clone();
        move || {
            let evicted = state.blacklist.cleanup();
            if evicted > 0 {
                debug!(evicted, "blacklist entries evicted");
            }
            async { Ok(()) }
        }
    });

    spawn_loop(shutdown.clone(), ORDER_SWEEP, {
        let state = state.clone();
        move || {
            let orders = state.orders.clone();
            async move { orders.expire_pending().await.map(|_| ()) }
        }
    });

    spawn_loop(shutdown.clone(), TRIAL_SWEEP, {
        let state = state.clone();
        move || {
            let trials = state.trials.clone();
            async move { trials.expire_trials().await.map(|_| ()) }
        }
    });

    spawn_loop(shutdown, COMMISSION_SWEEP, {
        move || {
            let commissions = state.commissions.clone();
            async move { commissions.confirm_pending().await.map(|_| ()) }
        }
    });
}

fn spawn_loop<F, Fut>(mut shutdown: watch::Receiver<bool>, period: Duration, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = vpanel_core::Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = tick().await {
                        error!(error = %err, "sweeper tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
