//! In-process store used by tests and local runs without a database

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CabinetStore, ChatStore, LedgerStore, PaymentStore, ReviewStore, Settlement, StatusWrite,
    StoreError,
};
use crate::models::{
    Cabinet, Chat, ChatMessage, NewChat, NewChatMessage, NewReview, NewTransaction, Payment,
    PaymentStatus, PromptSettings, Review, ReviewStatus, SenderRole, Transaction,
    TransactionType,
};

const FIRST_INVOICE_ID: i64 = 1000;

#[derive(Default)]
struct State {
    cabinets: HashMap<Uuid, Cabinet>,
    settings: PromptSettings,
    reviews: HashMap<Uuid, Review>,
    chats: HashMap<Uuid, Chat>,
    messages: Vec<ChatMessage>,
    payments: HashMap<i64, Payment>,
    next_invoice: i64,
    balances: HashMap<Uuid, i64>,
    transactions: Vec<Transaction>,
}

impl State {
    fn review_exists(&self, cabinet_id: Uuid, external_id: &str) -> bool {
        self.reviews
            .values()
            .any(|r| r.cabinet_id == cabinet_id && r.external_id == external_id)
    }

    fn chat_by_external(&self, cabinet_id: Uuid, external_id: &str) -> Option<Uuid> {
        self.chats
            .values()
            .find(|c| c.cabinet_id == cabinet_id && c.external_id == external_id)
            .map(|c| c.id)
    }

    fn cas_review<F>(&mut self, id: Uuid, expected: ReviewStatus, write: F) -> StatusWrite
    where
        F: FnOnce(&mut Review),
    {
        match self.reviews.get_mut(&id) {
            None => StatusWrite::NotFound,
            Some(review) if review.status != expected => StatusWrite::Conflict(review.status),
            Some(review) => {
                write(review);
                review.updated_at = Utc::now();
                StatusWrite::Applied
            }
        }
    }

    fn apply(&mut self, entry: &NewTransaction) -> Result<Transaction, StoreError> {
        let balance = self.balances.get(&entry.user_id).copied().unwrap_or(0);
        let balance_after = balance + entry.amount;
        if balance_after < 0 {
            return Err(StoreError::InsufficientBalance {
                balance,
                requested: -entry.amount,
            });
        }

        self.balances.insert(entry.user_id, balance_after);
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            amount: entry.amount,
            transaction_type: entry.transaction_type,
            description: entry.description.clone(),
            balance_after,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        Ok(transaction)
    }
}

/// All state behind one lock, so every trait method is atomic
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let state = State {
            next_invoice: FIRST_INVOICE_ID,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn insert_cabinet(&self, cabinet: Cabinet) {
        self.state.lock().await.cabinets.insert(cabinet.id, cabinet);
    }

    pub async fn set_prompt_settings(&self, settings: PromptSettings) {
        self.state.lock().await.settings = settings;
    }

    /// Insert a fully formed review row, bypassing the reconciler
    pub async fn insert_review(&self, review: Review) {
        self.state.lock().await.reviews.insert(review.id, review);
    }

    /// Move a review's `updated_at`, for exercising age-based jobs
    pub async fn set_review_updated_at(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(review) = self.state.lock().await.reviews.get_mut(&id) {
            review.updated_at = updated_at;
        }
    }

    pub async fn review_by_external(&self, cabinet_id: Uuid, external_id: &str) -> Option<Review> {
        self.state
            .lock()
            .await
            .reviews
            .values()
            .find(|r| r.cabinet_id == cabinet_id && r.external_id == external_id)
            .cloned()
    }

    pub async fn chat_by_external(&self, cabinet_id: Uuid, external_id: &str) -> Option<Chat> {
        let state = self.state.lock().await;
        state
            .chat_by_external(cabinet_id, external_id)
            .and_then(|id| state.chats.get(&id).cloned())
    }

    pub async fn messages_for_chat(&self, chat_id: Uuid) -> Vec<ChatMessage> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CabinetStore for MemoryStore {
    async fn get_cabinet(&self, id: Uuid) -> Result<Option<Cabinet>, StoreError> {
        Ok(self.state.lock().await.cabinets.get(&id).cloned())
    }

    async fn invalidate_api_key(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(cabinet) = self.state.lock().await.cabinets.get_mut(&id) {
            cabinet.api_key_valid = false;
            cabinet.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn prompt_settings(&self) -> Result<PromptSettings, StoreError> {
        Ok(self.state.lock().await.settings.clone())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn existing_review_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(external_ids
            .iter()
            .filter(|id| state.review_exists(cabinet_id, id))
            .cloned()
            .collect())
    }

    async fn insert_reviews(&self, reviews: Vec<NewReview>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        let now = Utc::now();

        for r in reviews {
            if state.review_exists(r.cabinet_id, &r.external_id) {
                continue;
            }
            let review = Review {
                id: Uuid::new_v4(),
                cabinet_id: r.cabinet_id,
                external_id: r.external_id,
                rating: r.rating,
                author_name: r.author_name,
                text: r.text,
                pros: r.pros,
                cons: r.cons,
                product_name: r.product_name,
                product_article: r.product_article,
                photo_urls: r.photo_urls,
                has_video: r.has_video,
                status: r.status,
                ai_draft: None,
                sent_answer: r.sent_answer,
                review_created_at: r.review_created_at,
                created_at: now,
                updated_at: now,
            };
            state.reviews.insert(review.id, review);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        Ok(self.state.lock().await.reviews.get(&id).cloned())
    }

    async fn list_reviews(
        &self,
        cabinet_id: Uuid,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<Review>, StoreError> {
        let state = self.state.lock().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| r.cabinet_id == cabinet_id && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.review_created_at.cmp(&a.review_created_at));
        Ok(reviews)
    }

    async fn new_reviews_for_auto_reply(
        &self,
        cabinet_id: Uuid,
        min_rating: i16,
        limit: i64,
    ) -> Result<Vec<Review>, StoreError> {
        let state = self.state.lock().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| {
                r.cabinet_id == cabinet_id
                    && r.status == ReviewStatus::New
                    && r.rating >= min_rating
            })
            .cloned()
            .collect();
        reviews.sort_by(|a, b| a.review_created_at.cmp(&b.review_created_at));
        reviews.truncate(limit.max(0) as usize);
        Ok(reviews)
    }

    async fn save_draft(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        draft: &str,
    ) -> Result<StatusWrite, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.cas_review(id, expected, |review| {
            review.ai_draft = Some(draft.to_string());
            review.status = next;
        }))
    }

    async fn record_answer(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        answer: &str,
    ) -> Result<StatusWrite, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.cas_review(id, expected, |review| {
            review.sent_answer = Some(answer.to_string());
            review.status = next;
        }))
    }

    async fn force_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
    ) -> Result<Option<ReviewStatus>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.reviews.get_mut(&id).map(|review| {
            let previous = review.status;
            review.status = status;
            review.updated_at = Utc::now();
            previous
        }))
    }

    async fn archive_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().await;
        let mut candidates: Vec<&Review> = state
            .reviews
            .values()
            .filter(|r| {
                matches!(r.status, ReviewStatus::Sent | ReviewStatus::Auto) && r.updated_at < cutoff
            })
            .collect();
        candidates.sort_by_key(|r| r.updated_at);
        Ok(candidates
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| r.id)
            .collect())
    }

    async fn archive_batch(&self, ids: &[Uuid], cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut archived = 0;

        for id in ids {
            if let Some(review) = state.reviews.get_mut(id) {
                if matches!(review.status, ReviewStatus::Sent | ReviewStatus::Auto)
                    && review.updated_at < cutoff
                {
                    review.status = ReviewStatus::Archived;
                    review.updated_at = now;
                    archived += 1;
                }
            }
        }

        Ok(archived)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn existing_chat_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(external_ids
            .iter()
            .filter(|id| state.chat_by_external(cabinet_id, id).is_some())
            .cloned()
            .collect())
    }

    async fn insert_chats(&self, chats: Vec<NewChat>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        let now = Utc::now();

        for c in chats {
            if state.chat_by_external(c.cabinet_id, &c.external_id).is_some() {
                continue;
            }
            let chat = Chat {
                id: Uuid::new_v4(),
                cabinet_id: c.cabinet_id,
                external_id: c.external_id,
                client_name: c.client_name,
                product_name: c.product_name,
                last_message_text: c.last_message_text,
                last_message_at: c.last_message_at,
                is_read: c.is_read,
                reply_sign: c.reply_sign,
                created_at: now,
                updated_at: now,
            };
            state.chats.insert(chat.id, chat);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn refresh_chat(&self, chat: &NewChat) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.chat_by_external(chat.cabinet_id, &chat.external_id) else {
            return Ok(());
        };
        if let Some(existing) = state.chats.get_mut(&id) {
            if chat.client_name.is_some() {
                existing.client_name = chat.client_name.clone();
            }
            if chat.product_name.is_some() {
                existing.product_name = chat.product_name.clone();
            }
            if chat.last_message_text.is_some() {
                existing.last_message_text = chat.last_message_text.clone();
            }
            if chat.last_message_at.is_some() {
                existing.last_message_at = chat.last_message_at;
            }
            if chat.reply_sign.is_some() {
                existing.reply_sign = chat.reply_sign.clone();
            }
            existing.is_read = chat.is_read;
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        Ok(self.state.lock().await.chats.get(&id).cloned())
    }

    async fn existing_message_keys(
        &self,
        cabinet_id: Uuid,
        event_ids: &[String],
    ) -> Result<HashSet<(String, String)>, StoreError> {
        let state = self.state.lock().await;
        let wanted: HashSet<&String> = event_ids.iter().collect();
        let mut keys = HashSet::new();

        for message in &state.messages {
            let Some(event_id) = &message.event_id else {
                continue;
            };
            if !wanted.contains(event_id) {
                continue;
            }
            if let Some(chat) = state.chats.get(&message.chat_id) {
                if chat.cabinet_id == cabinet_id {
                    keys.insert((chat.external_id.clone(), event_id.clone()));
                }
            }
        }

        Ok(keys)
    }

    async fn insert_messages(
        &self,
        cabinet_id: Uuid,
        messages: Vec<NewChatMessage>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;

        for m in messages {
            let Some(chat_id) = state.chat_by_external(cabinet_id, &m.chat_external_id) else {
                continue;
            };
            let duplicate = m.event_id.is_some()
                && state
                    .messages
                    .iter()
                    .any(|existing| existing.chat_id == chat_id && existing.event_id == m.event_id);
            if duplicate {
                continue;
            }
            state.messages.push(ChatMessage {
                id: Uuid::new_v4(),
                chat_id,
                sender: m.sender,
                text: m.text,
                attachments: m.attachments,
                event_id: m.event_id,
                sent_at: m.sent_at,
                created_at: Utc::now(),
            });
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn record_outbound(&self, chat_id: Uuid, text: &str) -> Result<ChatMessage, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let chat = state
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| StoreError::Database(format!("chat {} does not exist", chat_id)))?;
        chat.last_message_text = Some(text.to_string());
        chat.last_message_at = Some(now);
        chat.updated_at = now;

        let message = ChatMessage {
            id: Uuid::new_v4(),
            chat_id,
            sender: SenderRole::Seller,
            text: Some(text.to_string()),
            attachments: Vec::new(),
            event_id: None,
            sent_at: now,
            created_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_pending(
        &self,
        user_id: Uuid,
        amount: i64,
        tokens: i64,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        let invoice_id = state.next_invoice;
        state.next_invoice += 1;

        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_id,
            user_id,
            amount,
            tokens,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.payments.insert(invoice_id, payment.clone());
        Ok(payment)
    }

    async fn find_by_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&invoice_id).cloned())
    }

    async fn settle(&self, invoice_id: i64, description: &str) -> Result<Settlement, StoreError> {
        let mut state = self.state.lock().await;

        let payment = match state.payments.get(&invoice_id) {
            None => return Ok(Settlement::NotFound),
            Some(p) if p.status == PaymentStatus::Completed => {
                return Ok(Settlement::AlreadyCompleted(p.clone()))
            }
            Some(p) => p.clone(),
        };

        let transaction = state.apply(&NewTransaction {
            user_id: payment.user_id,
            amount: payment.tokens,
            transaction_type: TransactionType::Purchase,
            description: description.to_string(),
        })?;

        let mut completed = payment;
        completed.status = PaymentStatus::Completed;
        completed.completed_at = Some(Utc::now());
        state.payments.insert(invoice_id, completed.clone());

        Ok(Settlement::Settled {
            payment: completed,
            transaction,
        })
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn apply_entry(&self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        self.state.lock().await.apply(&entry)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn transactions_sum(&self, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && transaction_type.map_or(true, |k| t.transaction_type == k))
            .cloned()
            .collect();
        transactions.reverse();
        Ok(transactions)
    }
}
