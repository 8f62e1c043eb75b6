//! Allowed status transitions of a mirrored review

use thiserror::Error;

use crate::models::ReviewStatus;

/// Events that move a review forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTransition {
    /// AI draft stored (regeneration keeps `pending`)
    DraftGenerated,
    /// Seller-approved answer accepted upstream
    ReplySent,
    /// Automatically generated answer accepted upstream
    AutoReplySent,
    /// Age-based archival
    Archived,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot apply {transition:?} to a review in status '{}'", from.as_str())]
pub struct TransitionError {
    pub from: ReviewStatus,
    pub transition: ReviewTransition,
}

impl ReviewStatus {
    /// Status after `transition`, or an error if the move would go backwards
    pub fn apply(self, transition: ReviewTransition) -> Result<ReviewStatus, TransitionError> {
        use crate::models::ReviewStatus as S;
        use self::ReviewTransition as T;

        let next = match (self, transition) {
            (S::New | S::Pending, T::DraftGenerated) => Some(S::Pending),
            (S::New | S::Pending, T::ReplySent) => Some(S::Sent),
            (S::New | S::Pending, T::AutoReplySent) => Some(S::Auto),
            (S::Sent | S::Auto | S::Answered, T::Archived) => Some(S::Archived),
            _ => None,
        };

        next.ok_or(TransitionError {
            from: self,
            transition,
        })
    }

    /// An answer already exists on the marketplace side
    pub fn is_answered(self) -> bool {
        matches!(
            self,
            ReviewStatus::Answered
                | ReviewStatus::Sent
                | ReviewStatus::Auto
                | ReviewStatus::Archived
        )
    }
}
