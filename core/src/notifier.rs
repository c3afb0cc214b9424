//! Opaque notification channel
//!
//! The core emits domain events through this trait; the transport (mail,
//! Telegram, webhooks) is someone else's concern. Events always fire after
//! locks are released.

use async_trait::async_trait;

/// Events the core announces
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    OrderPaid {
        user_id: u64,
        order_no: String,
        pay_amount: i64,
    },
    CommissionConfirmed {
        user_id: u64,
        order_id: u64,
        amount: i64,
    },
    PasswordResetRequested {
        user_id: u64,
        token: String,
    },
    TrialActivated {
        user_id: u64,
    },
}

/// Opaque push channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

/// Default implementation: structured log lines only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        match event {
            NotifyEvent::OrderPaid {
                user_id,
                order_no,
                pay_amount,
            } => tracing::info!(user_id, %order_no, pay_amount, "order paid"),
            NotifyEvent::CommissionConfirmed {
                user_id,
                order_id,
                amount,
            } => tracing::info!(user_id, order_id, amount, "commission confirmed"),
            NotifyEvent::PasswordResetRequested { user_id, .. } => {
                // The token itself stays out of the logs.
                tracing::info!(user_id, "password reset requested");
            }
            NotifyEvent::TrialActivated { user_id } => {
                tracing::info!(user_id, "trial activated");
            }
        }
    }
}
