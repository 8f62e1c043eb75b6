//! Automatic replies for well-rated reviews

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::dispatcher::{DispatchError, DispatchMode, ReplyDispatcher};
use crate::ai::{DraftGenerator, GenerationError};
use crate::ledger::REPLY_COST;
use crate::store::Store;

/// Reviews taken per run
const AUTO_REPLY_BATCH: i64 = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoReplyReport {
    pub considered: u64,
    pub sent: u64,
    pub skipped: u64,
    /// Why the run ended early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<String>,
}

pub struct AutoReplier {
    store: Arc<dyn Store>,
    generator: DraftGenerator,
    dispatcher: ReplyDispatcher,
}

impl AutoReplier {
    pub fn new(store: Arc<dyn Store>, generator: DraftGenerator, dispatcher: ReplyDispatcher) -> Self {
        Self {
            store,
            generator,
            dispatcher,
        }
    }

    /// Answer `new` reviews at or above the cabinet's minimum rating.
    ///
    /// Stops at the first insufficient balance or upstream failure; other
    /// per-review failures are logged and skipped.
    pub async fn run_auto_replies(&self, cabinet_id: Uuid) -> Result<AutoReplyReport, DispatchError> {
        let cabinet = self
            .store
            .get_cabinet(cabinet_id)
            .await?
            .ok_or(DispatchError::CabinetNotFound(cabinet_id))?;

        let mut report = AutoReplyReport::default();
        if !cabinet.auto_reply_enabled {
            tracing::debug!(cabinet_id = %cabinet_id, "Auto replies disabled");
            return Ok(report);
        }

        let reviews = self
            .store
            .new_reviews_for_auto_reply(cabinet_id, cabinet.auto_reply_min_rating, AUTO_REPLY_BATCH)
            .await?;

        for review in reviews {
            report.considered += 1;

            let balance = self.store.balance(cabinet.user_id).await?;
            if balance < REPLY_COST {
                report.stopped = Some(
                    DispatchError::InsufficientBalance {
                        balance,
                        requested: REPLY_COST,
                    }
                    .to_string(),
                );
                break;
            }

            let text = match self.generator.compose(&review, &cabinet).await {
                Ok(text) => text,
                Err(GenerationError::EmptyGeneration) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    report.stopped = Some(e.to_string());
                    break;
                }
            };

            match self
                .dispatcher
                .dispatch(review.id, Some(text), DispatchMode::Auto)
                .await
            {
                Ok(outcome) if outcome.already_answered => report.skipped += 1,
                Ok(_) => report.sent += 1,
                Err(
                    e @ (DispatchError::InsufficientBalance { .. }
                    | DispatchError::Upstream(_)
                    | DispatchError::MissingCredential(_)),
                ) => {
                    report.stopped = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    tracing::warn!(review_id = %review.id, error = %e, "Auto reply skipped");
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(
            cabinet_id = %cabinet_id,
            considered = report.considered,
            sent = report.sent,
            skipped = report.skipped,
            stopped = ?report.stopped,
            "Auto replies finished"
        );

        Ok(report)
    }
}
