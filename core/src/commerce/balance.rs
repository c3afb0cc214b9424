//! Per-user balance with a transactional ledger
//!
//! Every mutation for a user runs under that user's async lock, so the
//! read-validate-append sequence is serialized and the invariant
//! `live balance == signed sum of transactions` holds under concurrency.
//! The lock is held across the store write but never across notification
//! or other slow side effects.

use crate::error::{PanelError, Result};
use crate::models::{BalanceTransaction, TransactionType};
use crate::store::{BalanceStore, Page};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serialized balance mutations over the ledger store
pub struct BalanceService {
    ledger: Arc<dyn BalanceStore>,
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl BalanceService {
    pub fn new(ledger: Arc<dyn BalanceStore>) -> Self {
        Self {
            ledger,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current balance in cents.
    pub async fn balance(&self, user_id: u64) -> Result<i64> {
        self.ledger.balance_of(user_id).await
    }

    /// Ledger page for the user, newest first.
    pub async fn history(
        &self,
        user_id: u64,
        page: Page,
    ) -> Result<(Vec<BalanceTransaction>, u64)> {
        self.ledger.list_by_user(user_id, page).await
    }

    /// Credit a top-up.
    pub async fn recharge(
        &self,
        user_id: u64,
        amount: i64,
        operator: &str,
    ) -> Result<BalanceTransaction> {
        if amount <= 0 {
            return Err(PanelError::validation("recharge amount must be positive"));
        }
        self.mutate(
            user_id,
            TransactionType::Recharge,
            amount,
            None,
            "balance recharge",
            operator,
        )
        .await
    }

    /// Spend from the balance; rejects when the balance cannot cover it.
    pub async fn deduct(
        &self,
        user_id: u64,
        amount: i64,
        order_id: Option<u64>,
        description: &str,
        operator: &str,
    ) -> Result<BalanceTransaction> {
        if amount <= 0 {
            return Err(PanelError::validation("deduct amount must be positive"));
        }
        self.mutate(
            user_id,
            TransactionType::Purchase,
            -amount,
            order_id,
            description,
            operator,
        )
        .await
    }

    /// Credit a refund back.
    pub async fn refund(
        &self,
        user_id: u64,
        amount: i64,
        order_id: Option<u64>,
        description: &str,
    ) -> Result<BalanceTransaction> {
        if amount <= 0 {
            return Err(PanelError::validation("refund amount must be positive"));
        }
        self.mutate(
            user_id,
            TransactionType::Refund,
            amount,
            order_id,
            description,
            "system",
        )
        .await
    }

    /// Credit a settled referral commission.
    pub async fn add_commission(
        &self,
        user_id: u64,
        amount: i64,
        order_id: Option<u64>,
    ) -> Result<BalanceTransaction> {
        if amount <= 0 {
            return Err(PanelError::validation("commission amount must be positive"));
        }
        self.mutate(
            user_id,
            TransactionType::Commission,
            amount,
            order_id,
            "referral commission",
            "system",
        )
        .await
    }

    /// Signed manual correction by an operator; rejects a result below
    /// zero.
    pub async fn adjust(
        &self,
        user_id: u64,
        amount: i64,
        reason: &str,
        operator: &str,
    ) -> Result<BalanceTransaction> {
        if amount == 0 {
            return Err(PanelError::validation("adjustment must be non-zero"));
        }
        self.mutate(
            user_id,
            TransactionType::Adjustment,
            amount,
            None,
            reason,
            operator,
        )
        .await
    }

    async fn mutate(
        &self,
        user_id: u64,
        tx_type: TransactionType,
        amount: i64,
        order_id: Option<u64>,
        description: &str,
        operator: &str,
    ) -> Result<BalanceTransaction> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let current = self.ledger.balance_of(user_id).await?;
        let next = current
            .checked_add(amount)
            .ok_or_else(|| PanelError::internal("balance overflow"))?;
        if next < 0 {
            return Err(PanelError::validation("insufficient balance"));
        }
        self.ledger
            .append(BalanceTransaction {
                id: 0,
                user_id,
                tx_type,
                amount,
                balance: next,
                order_id,
                description: description.to_string(),
                operator: operator.to_string(),
                created_at: Utc::now(),
            })
            .await
    }

    async fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBalanceStore;

    fn service() -> BalanceService {
        BalanceService::new(Arc::new(MemoryBalanceStore::new()))
    }

    #[tokio::test]
    async fn test_deduct_rejects_overdraft() {
        let service = service();
        service.recharge(1, 500, "admin").await.unwrap();
        assert!(service.deduct(1, 600, None, "x", "user").await.is_err());
        // Balance untouched by the rejected mutation
        assert_eq!(service.balance(1).await.unwrap(), 500);
        service.deduct(1, 500, None, "x", "user").await.unwrap();
        assert_eq!(service.balance(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_adjust_cannot_go_negative() {
        let service = service();
        service.recharge(1, 300, "admin").await.unwrap();
        assert!(service.adjust(1, -301, "oops", "admin").await.is_err());
        service.adjust(1, -300, "correction", "admin").await.unwrap();
        assert_eq!(service.balance(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ledger_records_post_balance() {
        let service = service();
        service.recharge(1, 1000, "admin").await.unwrap();
        let tx = service.deduct(1, 400, Some(7), "order", "user").await.unwrap();
        assert_eq!(tx.amount, -400);
        assert_eq!(tx.balance, 600);
        assert_eq!(tx.order_id, Some(7));
    }

    #[tokio::test]
    async fn test_ledger_sum_equals_balance_under_concurrency() {
        let service = Arc::new(service());
        service.recharge(1, 10_000, "admin").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let _ = service.recharge(1, 50, "admin").await;
                } else {
                    let _ = service.deduct(1, 50, None, "spend", "user").await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let balance = service.balance(1).await.unwrap();
        let (txs, _) = service
            .history(1, Page { number: 1, size: 1000 })
            .await
            .unwrap();
        let sum: i64 = txs.iter().map(|t| t.amount).sum();
        assert_eq!(balance, sum);
        assert!(balance >= 0);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let service = service();
        service.recharge(1, 100, "admin").await.unwrap();
        assert_eq!(service.balance(2).await.unwrap(), 0);
        assert!(service.deduct(2, 1, None, "x", "user").await.is_err());
    }
}
