//! AI draft generator
//!
//! Builds the prompt from the global settings row and the cabinet's own
//! rules, calls the completion API and stores the result as the review's
//! draft (`new`/`pending` -> `pending`).

mod client;
pub mod prompt;

pub use client::{CompletionApi, CompletionRequest, HttpCompletionClient};

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::CompletionConfig;
use crate::models::{Cabinet, Review};
use crate::reviews::{ReviewTransition, TransitionError};
use crate::store::{StatusWrite, Store, StoreError};
use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Completion API is not configured")]
    Configuration,

    #[error("Review {0} not found")]
    ReviewNotFound(Uuid),

    #[error("Cabinet {0} not found")]
    CabinetNotFound(Uuid),

    #[error("Completion API returned an empty draft")]
    EmptyGeneration,

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Completion API error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct DraftGenerator {
    store: Arc<dyn Store>,
    completion: Option<Arc<dyn CompletionApi>>,
    config: CompletionConfig,
}

impl DraftGenerator {
    pub fn new(
        store: Arc<dyn Store>,
        completion: Option<Arc<dyn CompletionApi>>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            store,
            completion,
            config,
        }
    }

    /// Generate reply text for a review without touching its state
    pub async fn compose(&self, review: &Review, cabinet: &Cabinet) -> Result<String, GenerationError> {
        let completion = self
            .completion
            .as_ref()
            .ok_or(GenerationError::Configuration)?;

        // Settings are resolved once per call, never cached across invocations
        let settings = self.store.prompt_settings().await?;
        let default_prompt = settings
            .default_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.config.default_prompt.clone());
        let model = settings
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.model.clone());

        let request = CompletionRequest {
            model,
            system: prompt::system_prompt(&default_prompt, cabinet),
            user: prompt::user_message(review),
            max_tokens: self.config.max_tokens,
        };

        let draft = completion.complete(&request).await?;
        let draft = draft.trim();
        if draft.is_empty() {
            tracing::warn!(review_id = %review.id, "Completion returned an empty draft");
            return Err(GenerationError::EmptyGeneration);
        }

        Ok(draft.to_string())
    }

    /// Generate and store a draft, moving the review to `pending`
    pub async fn generate_draft(&self, review_id: Uuid) -> Result<Review, GenerationError> {
        let review = self
            .store
            .get_review(review_id)
            .await?
            .ok_or(GenerationError::ReviewNotFound(review_id))?;

        let next = review.status.apply(ReviewTransition::DraftGenerated)?;

        let cabinet = self
            .store
            .get_cabinet(review.cabinet_id)
            .await?
            .ok_or(GenerationError::CabinetNotFound(review.cabinet_id))?;

        let draft = self.compose(&review, &cabinet).await?;

        match self
            .store
            .save_draft(review_id, review.status, next, &draft)
            .await?
        {
            StatusWrite::Applied => {}
            StatusWrite::Conflict(current) => {
                return Err(GenerationError::InvalidTransition(TransitionError {
                    from: current,
                    transition: ReviewTransition::DraftGenerated,
                }))
            }
            StatusWrite::NotFound => return Err(GenerationError::ReviewNotFound(review_id)),
        }

        tracing::info!(review_id = %review_id, chars = draft.chars().count(), "Draft stored");

        self.store
            .get_review(review_id)
            .await?
            .ok_or(GenerationError::ReviewNotFound(review_id))
    }
}
