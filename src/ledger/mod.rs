//! Token ledger
//!
//! Append-only transaction log plus a per-user balance projection. Every
//! mutation goes through `LedgerStore::apply_entry`, which moves the
//! projection and writes the log row atomically and refuses to go negative.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewTransaction, Transaction, TransactionType};
use crate::store::{Store, StoreError};

/// Tokens charged for one successfully sent reply
pub const REPLY_COST: i64 = 1;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientBalance { balance, requested } => {
                LedgerError::InsufficientBalance { balance, requested }
            }
            other => LedgerError::Store(other),
        }
    }
}

/// Projection compared against the fold of the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    pub projected: i64,
    pub recomputed: i64,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add `amount` (> 0) to the user's balance
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.apply(user_id, amount, transaction_type, description.into())
            .await
    }

    /// Take `amount` (> 0) from the user's balance; fails rather than going negative
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.apply(user_id, -amount, transaction_type, description.into())
            .await
    }

    /// Signed administrative correction
    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: i64,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.apply(user_id, amount, TransactionType::Admin, description.into())
            .await
    }

    pub async fn grant_bonus(
        &self,
        user_id: Uuid,
        amount: i64,
        description: impl Into<String>,
    ) -> Result<Transaction, LedgerError> {
        self.credit(user_id, amount, TransactionType::Bonus, description)
            .await
    }

    async fn apply(
        &self,
        user_id: Uuid,
        amount: i64,
        transaction_type: TransactionType,
        description: String,
    ) -> Result<Transaction, LedgerError> {
        let transaction = self
            .store
            .apply_entry(NewTransaction {
                user_id,
                amount,
                transaction_type,
                description,
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            amount,
            kind = transaction_type.as_str(),
            balance_after = transaction.balance_after,
            "Ledger entry applied"
        );

        Ok(transaction)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<i64, LedgerError> {
        Ok(self.store.balance(user_id).await?)
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .store
            .list_transactions(user_id, transaction_type)
            .await?)
    }

    /// Balance as a fold over the transaction log
    pub async fn recompute_balance(&self, user_id: Uuid) -> Result<i64, LedgerError> {
        Ok(self.store.transactions_sum(user_id).await?)
    }

    pub async fn verify_balance(&self, user_id: Uuid) -> Result<BalanceCheck, LedgerError> {
        let projected = self.balance(user_id).await?;
        let recomputed = self.recompute_balance(user_id).await?;
        let consistent = projected == recomputed;

        if !consistent {
            tracing::error!(
                target: "ledger_anomaly",
                user_id = %user_id,
                projected,
                recomputed,
                "Balance projection diverged from transaction log"
            );
        }

        Ok(BalanceCheck {
            projected,
            recomputed,
            consistent,
        })
    }
}
