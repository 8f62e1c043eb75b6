//! Repository abstraction for the mirror, payments and the ledger.
//!
//! Services only talk to these traits. `PgStore` is the production backend;
//! `MemoryStore` keeps everything in process and backs the test suite.
//! Every method is a self-contained atomic unit so that overlapping
//! invocations stay correct without in-process coordination.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Cabinet, Chat, ChatMessage, NewChat, NewChatMessage, NewReview, NewTransaction, Payment,
    PromptSettings, Review, ReviewStatus, Transaction, TransactionType,
};

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Result of a compare-and-set status write on a review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    /// Row matched the expected status and was updated
    Applied,
    /// Row exists but another writer moved it first
    Conflict(ReviewStatus),
    NotFound,
}

/// Result of settling a gateway payment
#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call flipped pending -> completed and applied the credit
    Settled {
        payment: Payment,
        transaction: Transaction,
    },
    /// Payment was already completed; nothing changed
    AlreadyCompleted(Payment),
    NotFound,
}

#[async_trait]
pub trait CabinetStore: Send + Sync {
    async fn get_cabinet(&self, id: Uuid) -> Result<Option<Cabinet>, StoreError>;

    /// Flag the cabinet's marketplace key as rejected by the provider
    async fn invalidate_api_key(&self, id: Uuid) -> Result<(), StoreError>;

    async fn prompt_settings(&self) -> Result<PromptSettings, StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Subset of `external_ids` already mirrored for the cabinet
    async fn existing_review_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Insert-if-absent keyed on (cabinet_id, external_id). Returns rows inserted.
    async fn insert_reviews(&self, reviews: Vec<NewReview>) -> Result<u64, StoreError>;

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError>;

    async fn list_reviews(
        &self,
        cabinet_id: Uuid,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<Review>, StoreError>;

    /// `new` reviews at or above `min_rating`, oldest first
    async fn new_reviews_for_auto_reply(
        &self,
        cabinet_id: Uuid,
        min_rating: i16,
        limit: i64,
    ) -> Result<Vec<Review>, StoreError>;

    /// Store a draft and move to `next`, only if the row is still in `expected`
    async fn save_draft(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        draft: &str,
    ) -> Result<StatusWrite, StoreError>;

    /// Record the sent answer and move to `next`, only if still in `expected`
    async fn record_answer(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        answer: &str,
    ) -> Result<StatusWrite, StoreError>;

    /// Unconditional status write for administrative overrides
    async fn force_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
    ) -> Result<Option<ReviewStatus>, StoreError>;

    /// Ids of `sent`/`auto` reviews last updated before `cutoff`
    async fn archive_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Archive one batch atomically; rows that changed status meanwhile are skipped
    async fn archive_batch(&self, ids: &[Uuid], cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn existing_chat_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    async fn insert_chats(&self, chats: Vec<NewChat>) -> Result<u64, StoreError>;

    /// Refresh cached fields of an already mirrored chat
    async fn refresh_chat(&self, chat: &NewChat) -> Result<(), StoreError>;

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError>;

    /// `(chat external id, event id)` pairs already stored for the cabinet
    async fn existing_message_keys(
        &self,
        cabinet_id: Uuid,
        event_ids: &[String],
    ) -> Result<HashSet<(String, String)>, StoreError>;

    /// Insert-if-absent keyed on (chat, event_id). Messages for unknown chats are skipped.
    async fn insert_messages(
        &self,
        cabinet_id: Uuid,
        messages: Vec<NewChatMessage>,
    ) -> Result<u64, StoreError>;

    /// Record an outbound seller message and refresh the chat's last-message cache
    async fn record_outbound(&self, chat_id: Uuid, text: &str) -> Result<ChatMessage, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Create a pending payment with the next invoice id from the sequence
    async fn create_pending(
        &self,
        user_id: Uuid,
        amount: i64,
        tokens: i64,
    ) -> Result<Payment, StoreError>;

    async fn find_by_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, StoreError>;

    /// Flip pending -> completed and credit the purchased tokens as one unit.
    /// Concurrent callers for the same invoice: exactly one gets `Settled`.
    async fn settle(&self, invoice_id: i64, description: &str) -> Result<Settlement, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply a signed entry to the balance projection and append it to the log.
    /// Fails with `InsufficientBalance` when the result would be negative.
    async fn apply_entry(&self, entry: NewTransaction) -> Result<Transaction, StoreError>;

    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError>;

    /// Fold over the transaction log
    async fn transactions_sum(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn list_transactions(
        &self,
        user_id: Uuid,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, StoreError>;
}

/// Everything the services need from persistence
pub trait Store: CabinetStore + ReviewStore + ChatStore + PaymentStore + LedgerStore {}

impl<T> Store for T where T: CabinetStore + ReviewStore + ChatStore + PaymentStore + LedgerStore {}
