//! Review lifecycle: state machine, reply dispatch, auto replies and archival

pub mod archival;
pub mod auto_reply;
pub mod dispatcher;
pub mod state_machine;

pub use archival::{ArchivalError, ArchiveReport, Archiver};
pub use auto_reply::{AutoReplier, AutoReplyReport};
pub use dispatcher::{DispatchError, DispatchMode, DispatchOutcome, ReplyDispatcher};
pub use state_machine::{ReviewTransition, TransitionError};

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Review, ReviewStatus};
use crate::store::{Store, StoreError};

/// Read access and administrative overrides
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn Store>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_reviews(
        &self,
        cabinet_id: Uuid,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<Review>, StoreError> {
        self.store.list_reviews(cabinet_id, status).await
    }

    pub async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>, StoreError> {
        self.store.get_review(review_id).await
    }

    /// Force a status outside the state machine. Returns the updated review.
    pub async fn override_status(
        &self,
        review_id: Uuid,
        status: ReviewStatus,
        admin_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        let Some(previous) = self.store.force_status(review_id, status).await? else {
            return Ok(None);
        };

        tracing::warn!(
            target: "audit",
            admin_id = %admin_id,
            review_id = %review_id,
            from = previous.as_str(),
            to = status.as_str(),
            "Review status overridden"
        );

        self.store.get_review(review_id).await
    }
}
