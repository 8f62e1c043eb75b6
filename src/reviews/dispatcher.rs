//! Reply dispatcher
//!
//! Sends an answer upstream first, then records it on the review, then
//! charges the ledger. A failed send leaves the review and the balance as
//! they were; a failed charge after a successful send is an anomaly that is
//! logged for reconciliation rather than rolled back.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::state_machine::{ReviewTransition, TransitionError};
use crate::ledger::{Ledger, REPLY_COST};
use crate::marketplace::MarketplaceApi;
use crate::models::{Review, Transaction, TransactionType};
use crate::store::{StatusWrite, Store, StoreError};
use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Review {0} not found")]
    ReviewNotFound(Uuid),

    #[error("Cabinet {0} not found")]
    CabinetNotFound(Uuid),

    #[error("Reply text is empty")]
    EmptyText,

    #[error("Cabinet {0} has no valid marketplace API key")]
    MissingCredential(Uuid),

    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Marketplace error: {0}")]
    Upstream(UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which path recorded the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Manual,
    Auto,
}

impl DispatchMode {
    fn transition(self) -> ReviewTransition {
        match self {
            DispatchMode::Manual => ReviewTransition::ReplySent,
            DispatchMode::Auto => ReviewTransition::AutoReplySent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub review: Review,
    /// Review already carried an answer; nothing was sent or charged
    pub already_answered: bool,
    pub charged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

#[derive(Clone)]
pub struct ReplyDispatcher {
    store: Arc<dyn Store>,
    marketplace: Arc<dyn MarketplaceApi>,
    ledger: Ledger,
}

impl ReplyDispatcher {
    pub fn new(store: Arc<dyn Store>, marketplace: Arc<dyn MarketplaceApi>) -> Self {
        let ledger = Ledger::new(store.clone());
        Self {
            store,
            marketplace,
            ledger,
        }
    }

    /// Send `text` (or the stored draft) as the answer to a review
    pub async fn send_reply(
        &self,
        review_id: Uuid,
        text: Option<String>,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch(review_id, text, DispatchMode::Manual).await
    }

    pub async fn dispatch(
        &self,
        review_id: Uuid,
        text: Option<String>,
        mode: DispatchMode,
    ) -> Result<DispatchOutcome, DispatchError> {
        let review = self
            .store
            .get_review(review_id)
            .await?
            .ok_or(DispatchError::ReviewNotFound(review_id))?;

        if review.status.is_answered() {
            tracing::info!(review_id = %review_id, status = review.status.as_str(), "Review already answered, skipping send");
            return Ok(DispatchOutcome {
                review,
                already_answered: true,
                charged: false,
                transaction: None,
            });
        }

        let text = text
            .or_else(|| review.ai_draft.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(DispatchError::EmptyText)?;

        let next = review.status.apply(mode.transition())?;

        let cabinet = self
            .store
            .get_cabinet(review.cabinet_id)
            .await?
            .ok_or(DispatchError::CabinetNotFound(review.cabinet_id))?;
        let key = cabinet
            .usable_api_key()
            .ok_or(DispatchError::MissingCredential(cabinet.id))?;

        let balance = self.store.balance(cabinet.user_id).await?;
        if balance < REPLY_COST {
            return Err(DispatchError::InsufficientBalance {
                balance,
                requested: REPLY_COST,
            });
        }

        if let Err(e) = self
            .marketplace
            .send_reply_to_review(key, &review.external_id, &text)
            .await
        {
            if e.is_unauthorized() {
                tracing::warn!(cabinet_id = %cabinet.id, "Marketplace rejected API key, marking invalid");
                if let Err(store_err) = self.store.invalidate_api_key(cabinet.id).await {
                    tracing::error!(cabinet_id = %cabinet.id, error = %store_err, "Failed to mark API key invalid");
                }
            }
            tracing::warn!(review_id = %review_id, error = %e, "Reply rejected upstream");
            return Err(DispatchError::Upstream(e));
        }

        match self
            .store
            .record_answer(review_id, review.status, next, &text)
            .await?
        {
            StatusWrite::Applied => {}
            StatusWrite::Conflict(current) if current.is_answered() => {
                // A concurrent dispatch won; it owns the charge
                tracing::info!(
                    review_id = %review_id,
                    status = current.as_str(),
                    "Review answered concurrently while reply was in flight"
                );
                let review = self
                    .store
                    .get_review(review_id)
                    .await?
                    .ok_or(DispatchError::ReviewNotFound(review_id))?;
                return Ok(DispatchOutcome {
                    review,
                    already_answered: true,
                    charged: false,
                    transaction: None,
                });
            }
            StatusWrite::Conflict(current) => {
                tracing::warn!(
                    review_id = %review_id,
                    status = current.as_str(),
                    "Review changed while reply was in flight"
                );
                return Err(DispatchError::InvalidTransition(TransitionError {
                    from: current,
                    transition: mode.transition(),
                }));
            }
            StatusWrite::NotFound => return Err(DispatchError::ReviewNotFound(review_id)),
        }

        let description = format!("Ответ на отзыв {}", review.external_id);
        let (charged, transaction) = match self
            .ledger
            .debit(cabinet.user_id, REPLY_COST, TransactionType::Usage, description)
            .await
        {
            Ok(transaction) => (true, Some(transaction)),
            Err(e) => {
                tracing::error!(
                    target: "ledger_anomaly",
                    user_id = %cabinet.user_id,
                    review_id = %review_id,
                    amount = REPLY_COST,
                    error = %e,
                    "Reply sent but usage debit failed"
                );
                (false, None)
            }
        };

        let review = self
            .store
            .get_review(review_id)
            .await?
            .ok_or(DispatchError::ReviewNotFound(review_id))?;

        tracing::info!(
            review_id = %review_id,
            status = review.status.as_str(),
            charged,
            "Reply dispatched"
        );

        Ok(DispatchOutcome {
            review,
            already_answered: false,
            charged,
            transaction,
        })
    }
}
