//! Drafts, reply dispatch, auto replies and archival

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use common::*;
use reviewdesk_server::ai::{CompletionApi, DraftGenerator, GenerationError};
use reviewdesk_server::config::ArchivalConfig;
use reviewdesk_server::ledger::Ledger;
use reviewdesk_server::marketplace::{ChatInfo, EventsPage, Feedback, MarketplaceApi};
use reviewdesk_server::models::{
    Cabinet, Chat, ChatMessage, NewChat, NewChatMessage, NewReview, NewTransaction, Payment,
    PromptSettings, Review, ReviewStatus, Transaction, TransactionType,
};
use reviewdesk_server::reviews::{
    Archiver, AutoReplier, DispatchError, ReplyDispatcher, ReviewService,
};
use reviewdesk_server::store::{
    CabinetStore, ChatStore, LedgerStore, MemoryStore, PaymentStore, ReviewStore, Settlement,
    StatusWrite, Store, StoreError,
};
use reviewdesk_server::upstream::UpstreamError;

struct Harness {
    store: Arc<MemoryStore>,
    marketplace: Arc<FakeMarketplace>,
    completion: Arc<FakeCompletion>,
    cabinet: Cabinet,
}

impl Harness {
    async fn new() -> Self {
        let (store, cabinet) = store_with_cabinet(Uuid::new_v4()).await;
        Self {
            store,
            marketplace: Arc::new(FakeMarketplace::default()),
            completion: Arc::new(FakeCompletion::answering("Спасибо, что выбрали нас!")),
            cabinet,
        }
    }

    fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    fn dispatcher(&self) -> ReplyDispatcher {
        ReplyDispatcher::new(self.dyn_store(), self.marketplace.clone())
    }

    fn generator(&self) -> DraftGenerator {
        let completion: Arc<dyn CompletionApi> = self.completion.clone();
        DraftGenerator::new(self.dyn_store(), Some(completion), completion_config())
    }

    fn ledger(&self) -> Ledger {
        Ledger::new(self.dyn_store())
    }

    async fn fund(&self, tokens: i64) {
        self.ledger()
            .grant_bonus(self.cabinet.user_id, tokens, "Приветственный бонус")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_draft_moves_new_to_pending() {
    let h = Harness::new().await;
    let review = review(h.cabinet.id, ReviewStatus::New, 5);
    h.store.insert_review(review.clone()).await;

    let updated = h.generator().generate_draft(review.id).await.unwrap();
    assert_eq!(updated.status, ReviewStatus::Pending);
    assert_eq!(updated.ai_draft.as_deref(), Some("Спасибо, что выбрали нас!"));

    // Regeneration keeps the review pending
    *h.completion.answer.lock().unwrap() = Ok("Второй вариант".to_string());
    let regenerated = h.generator().generate_draft(review.id).await.unwrap();
    assert_eq!(regenerated.status, ReviewStatus::Pending);
    assert_eq!(regenerated.ai_draft.as_deref(), Some("Второй вариант"));
}

#[tokio::test]
async fn test_draft_uses_stored_settings_and_cabinet_rules() {
    let h = Harness::new().await;
    let mut cabinet = h.cabinet.clone();
    cabinet.prompt_rules = Some("Обращайся на «вы».".to_string());
    h.store.insert_cabinet(cabinet).await;
    h.store
        .set_prompt_settings(reviewdesk_server::models::PromptSettings {
            default_prompt: Some("Ты вежливый продавец.".to_string()),
            model: Some("gpt-test".to_string()),
        })
        .await;

    let review = review(h.cabinet.id, ReviewStatus::New, 4);
    h.store.insert_review(review.clone()).await;
    h.generator().generate_draft(review.id).await.unwrap();

    let requests = h.completion.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "gpt-test");
    assert!(requests[0].system.starts_with("Ты вежливый продавец."));
    assert!(requests[0].system.contains("Обращайся на «вы»."));
    assert!(requests[0].user.contains("Отличный товар"));
}

#[tokio::test]
async fn test_draft_refused_for_answered_review() {
    let h = Harness::new().await;
    let review = review(h.cabinet.id, ReviewStatus::Sent, 5);
    h.store.insert_review(review.clone()).await;

    let err = h.generator().generate_draft(review.id).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidTransition(_)));
    assert!(h.completion.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_generation_leaves_review_untouched() {
    let h = Harness::new().await;
    *h.completion.answer.lock().unwrap() = Ok("   ".to_string());
    let review = review(h.cabinet.id, ReviewStatus::New, 5);
    h.store.insert_review(review.clone()).await;

    let err = h.generator().generate_draft(review.id).await.unwrap_err();
    assert!(matches!(err, GenerationError::EmptyGeneration));

    let stored = h.store.get_review(review.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReviewStatus::New);
    assert!(stored.ai_draft.is_none());
}

#[tokio::test]
async fn test_draft_without_completion_client() {
    let h = Harness::new().await;
    let review = review(h.cabinet.id, ReviewStatus::New, 5);
    h.store.insert_review(review.clone()).await;

    let generator = DraftGenerator::new(h.dyn_store(), None, completion_config());
    let err = generator.generate_draft(review.id).await.unwrap_err();
    assert!(matches!(err, GenerationError::Configuration));
}

#[tokio::test]
async fn test_reply_sends_draft_and_charges_one_token() {
    let h = Harness::new().await;
    h.fund(5).await;
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Благодарим за отзыв!".to_string());
    h.store.insert_review(review.clone()).await;

    let outcome = h.dispatcher().send_reply(review.id, None).await.unwrap();

    assert!(!outcome.already_answered);
    assert!(outcome.charged);
    assert_eq!(outcome.review.status, ReviewStatus::Sent);
    assert_eq!(outcome.review.sent_answer.as_deref(), Some("Благодарим за отзыв!"));
    assert_eq!(
        h.marketplace.replies(),
        vec![(review.external_id.clone(), "Благодарим за отзыв!".to_string())]
    );

    let transaction = outcome.transaction.unwrap();
    assert_eq!(transaction.amount, -1);
    assert_eq!(transaction.transaction_type, TransactionType::Usage);
    assert_eq!(transaction.balance_after, 4);
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_reply_text_overrides_draft() {
    let h = Harness::new().await;
    h.fund(1).await;
    let mut review = review(h.cabinet.id, ReviewStatus::New, 5);
    review.ai_draft = Some("Черновик".to_string());
    h.store.insert_review(review.clone()).await;

    let outcome = h
        .dispatcher()
        .send_reply(review.id, Some("  Свой ответ ".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome.review.sent_answer.as_deref(), Some("Свой ответ"));
}

#[tokio::test]
async fn test_upstream_failure_leaves_state_unchanged() {
    let h = Harness::new().await;
    h.fund(3).await;
    *h.marketplace.reply_error.lock().unwrap() = Some(UpstreamError::Status {
        status: 500,
        body: "oops".to_string(),
    });
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Спасибо!".to_string());
    h.store.insert_review(review.clone()).await;

    let err = h.dispatcher().send_reply(review.id, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::Upstream(_)));

    let stored = h.store.get_review(review.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReviewStatus::Pending);
    assert!(stored.sent_answer.is_none());
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 3);
    assert!(h.store.get_cabinet(h.cabinet.id).await.unwrap().unwrap().api_key_valid);
}

#[tokio::test]
async fn test_rejected_key_on_reply_is_invalidated() {
    let h = Harness::new().await;
    h.fund(3).await;
    *h.marketplace.reply_error.lock().unwrap() = Some(UpstreamError::Status {
        status: 403,
        body: "forbidden".to_string(),
    });
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Спасибо!".to_string());
    h.store.insert_review(review.clone()).await;

    h.dispatcher().send_reply(review.id, None).await.unwrap_err();
    assert!(!h.store.get_cabinet(h.cabinet.id).await.unwrap().unwrap().api_key_valid);

    let err = h.dispatcher().send_reply(review.id, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::MissingCredential(_)));
}

#[tokio::test]
async fn test_insufficient_balance_blocks_send() {
    let h = Harness::new().await;
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Спасибо!".to_string());
    h.store.insert_review(review.clone()).await;

    let err = h.dispatcher().send_reply(review.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::InsufficientBalance {
            balance: 0,
            requested: 1
        }
    ));
    assert!(h.marketplace.replies().is_empty());
    assert_eq!(
        h.store.get_review(review.id).await.unwrap().unwrap().status,
        ReviewStatus::Pending
    );
}

#[tokio::test]
async fn test_answered_review_is_not_sent_again() {
    let h = Harness::new().await;
    h.fund(3).await;
    let mut review = review(h.cabinet.id, ReviewStatus::Sent, 5);
    review.sent_answer = Some("Уже ответили".to_string());
    h.store.insert_review(review.clone()).await;

    let outcome = h
        .dispatcher()
        .send_reply(review.id, Some("Ещё раз".to_string()))
        .await
        .unwrap();

    assert!(outcome.already_answered);
    assert!(!outcome.charged);
    assert_eq!(outcome.review.sent_answer.as_deref(), Some("Уже ответили"));
    assert!(h.marketplace.replies().is_empty());
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 3);
}

/// Marketplace that lets a competing dispatch record its answer while ours is in flight
struct RacingMarketplace {
    store: Arc<MemoryStore>,
    review_id: Uuid,
}

#[async_trait]
impl MarketplaceApi for RacingMarketplace {
    async fn fetch_reviews_page(
        &self,
        _api_key: &str,
        _is_answered: bool,
        _skip: u32,
        _take: u32,
    ) -> Result<Vec<Feedback>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn fetch_chats_page(
        &self,
        _api_key: &str,
        _skip: u32,
        _take: u32,
    ) -> Result<Vec<ChatInfo>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn fetch_chat_events(
        &self,
        _api_key: &str,
        _next: Option<i64>,
    ) -> Result<EventsPage, UpstreamError> {
        Ok(EventsPage::default())
    }

    async fn send_reply_to_review(
        &self,
        _api_key: &str,
        _external_id: &str,
        _text: &str,
    ) -> Result<(), UpstreamError> {
        let write = self
            .store
            .record_answer(
                self.review_id,
                ReviewStatus::Pending,
                ReviewStatus::Sent,
                "Ответ коллеги",
            )
            .await
            .unwrap();
        assert_eq!(write, StatusWrite::Applied);
        Ok(())
    }

    async fn send_chat_message(
        &self,
        _api_key: &str,
        _reply_sign: &str,
        _text: &str,
    ) -> Result<(), UpstreamError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_reply_losing_concurrent_dispatch_is_already_answered() {
    let h = Harness::new().await;
    h.fund(5).await;
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Спасибо!".to_string());
    h.store.insert_review(review.clone()).await;

    let marketplace = Arc::new(RacingMarketplace {
        store: h.store.clone(),
        review_id: review.id,
    });
    let dispatcher = ReplyDispatcher::new(h.dyn_store(), marketplace);

    let outcome = dispatcher.send_reply(review.id, None).await.unwrap();

    assert!(outcome.already_answered);
    assert!(!outcome.charged);
    assert!(outcome.transaction.is_none());
    assert_eq!(outcome.review.status, ReviewStatus::Sent);
    assert_eq!(outcome.review.sent_answer.as_deref(), Some("Ответ коллеги"));

    // The winner owns the charge; this call made none
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 5);
    let usage = h
        .ledger()
        .list_transactions(h.cabinet.user_id, Some(TransactionType::Usage))
        .await
        .unwrap();
    assert!(usage.is_empty());
}

#[tokio::test]
async fn test_reply_without_text_or_draft() {
    let h = Harness::new().await;
    h.fund(1).await;
    let review = review(h.cabinet.id, ReviewStatus::New, 5);
    h.store.insert_review(review.clone()).await;

    let err = h.dispatcher().send_reply(review.id, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::EmptyText));
}

#[tokio::test]
async fn test_auto_replies_answer_well_rated_reviews() {
    let h = Harness::new().await;
    let mut cabinet = h.cabinet.clone();
    cabinet.auto_reply_enabled = true;
    cabinet.auto_reply_min_rating = 4;
    h.store.insert_cabinet(cabinet).await;
    h.fund(10).await;

    let good = review(h.cabinet.id, ReviewStatus::New, 5);
    let fine = review(h.cabinet.id, ReviewStatus::New, 4);
    let poor = review(h.cabinet.id, ReviewStatus::New, 2);
    for r in [&good, &fine, &poor] {
        h.store.insert_review(r.clone()).await;
    }

    let replier = AutoReplier::new(h.dyn_store(), h.generator(), h.dispatcher());
    let report = replier.run_auto_replies(h.cabinet.id).await.unwrap();

    assert_eq!(report.considered, 2);
    assert_eq!(report.sent, 2);
    assert!(report.stopped.is_none());

    for r in [&good, &fine] {
        let stored = h.store.get_review(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReviewStatus::Auto);
        assert_eq!(stored.sent_answer.as_deref(), Some("Спасибо, что выбрали нас!"));
    }
    assert_eq!(
        h.store.get_review(poor.id).await.unwrap().unwrap().status,
        ReviewStatus::New
    );
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 8);
}

#[tokio::test]
async fn test_auto_replies_stop_when_balance_runs_out() {
    let h = Harness::new().await;
    let mut cabinet = h.cabinet.clone();
    cabinet.auto_reply_enabled = true;
    h.store.insert_cabinet(cabinet).await;
    h.fund(1).await;

    for _ in 0..3 {
        h.store
            .insert_review(review(h.cabinet.id, ReviewStatus::New, 5))
            .await;
    }

    let replier = AutoReplier::new(h.dyn_store(), h.generator(), h.dispatcher());
    let report = replier.run_auto_replies(h.cabinet.id).await.unwrap();

    assert_eq!(report.sent, 1);
    assert!(report.stopped.is_some());
    assert_eq!(h.marketplace.replies().len(), 1);
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_auto_replies_disabled_cabinet() {
    let h = Harness::new().await;
    h.fund(5).await;
    h.store
        .insert_review(review(h.cabinet.id, ReviewStatus::New, 5))
        .await;

    let replier = AutoReplier::new(h.dyn_store(), h.generator(), h.dispatcher());
    let report = replier.run_auto_replies(h.cabinet.id).await.unwrap();
    assert_eq!(report.considered, 0);
    assert!(h.marketplace.replies().is_empty());
}

#[tokio::test]
async fn test_archival_moves_stale_answers_once() {
    let h = Harness::new().await;
    let stale_sent = review(h.cabinet.id, ReviewStatus::Sent, 5);
    let stale_auto = review(h.cabinet.id, ReviewStatus::Auto, 5);
    let fresh_sent = review(h.cabinet.id, ReviewStatus::Sent, 5);
    let stale_pending = review(h.cabinet.id, ReviewStatus::Pending, 5);
    for r in [&stale_sent, &stale_auto, &fresh_sent, &stale_pending] {
        h.store.insert_review(r.clone()).await;
    }
    let old = Utc::now() - Duration::days(10);
    for r in [&stale_sent, &stale_auto, &stale_pending] {
        h.store.set_review_updated_at(r.id, old).await;
    }

    let archiver = Archiver::new(
        h.dyn_store(),
        ArchivalConfig {
            batch_size: 1,
            ..ArchivalConfig::default()
        },
    );

    let report = archiver.run().await.unwrap();
    assert_eq!(report.archived, 2);
    assert_eq!(report.batches, 2);

    let status = |id| {
        let store = h.store.clone();
        async move { store.get_review(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(stale_sent.id).await, ReviewStatus::Archived);
    assert_eq!(status(stale_auto.id).await, ReviewStatus::Archived);
    assert_eq!(status(fresh_sent.id).await, ReviewStatus::Sent);
    assert_eq!(status(stale_pending.id).await, ReviewStatus::Pending);

    let again = archiver.run().await.unwrap();
    assert_eq!(again.archived, 0);
}

/// Memory store with injectable write failures
struct FlakyStore {
    inner: MemoryStore,
    batch_calls: AtomicUsize,
    /// Archive batches fail from this call on (1-based)
    fail_batches_from: Option<usize>,
    fail_invalidate: bool,
}

impl FlakyStore {
    fn wrap(inner: &MemoryStore) -> Self {
        Self {
            inner: inner.clone(),
            batch_calls: AtomicUsize::new(0),
            fail_batches_from: None,
            fail_invalidate: false,
        }
    }
}

#[async_trait]
impl CabinetStore for FlakyStore {
    async fn get_cabinet(&self, id: Uuid) -> Result<Option<Cabinet>, StoreError> {
        self.inner.get_cabinet(id).await
    }

    async fn invalidate_api_key(&self, id: Uuid) -> Result<(), StoreError> {
        if self.fail_invalidate {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.invalidate_api_key(id).await
    }

    async fn prompt_settings(&self) -> Result<PromptSettings, StoreError> {
        self.inner.prompt_settings().await
    }
}

#[async_trait]
impl ReviewStore for FlakyStore {
    async fn existing_review_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        self.inner.existing_review_ids(cabinet_id, external_ids).await
    }

    async fn insert_reviews(&self, reviews: Vec<NewReview>) -> Result<u64, StoreError> {
        self.inner.insert_reviews(reviews).await
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        self.inner.get_review(id).await
    }

    async fn list_reviews(
        &self,
        cabinet_id: Uuid,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<Review>, StoreError> {
        self.inner.list_reviews(cabinet_id, status).await
    }

    async fn new_reviews_for_auto_reply(
        &self,
        cabinet_id: Uuid,
        min_rating: i16,
        limit: i64,
    ) -> Result<Vec<Review>, StoreError> {
        self.inner
            .new_reviews_for_auto_reply(cabinet_id, min_rating, limit)
            .await
    }

    async fn save_draft(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        draft: &str,
    ) -> Result<StatusWrite, StoreError> {
        self.inner.save_draft(id, expected, next, draft).await
    }

    async fn record_answer(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        answer: &str,
    ) -> Result<StatusWrite, StoreError> {
        self.inner.record_answer(id, expected, next, answer).await
    }

    async fn force_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
    ) -> Result<Option<ReviewStatus>, StoreError> {
        self.inner.force_status(id, status).await
    }

    async fn archive_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.inner.archive_candidates(cutoff, limit).await
    }

    async fn archive_batch(&self, ids: &[Uuid], cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_batches_from.is_some_and(|from| call >= from) {
            return Err(StoreError::Database("connection reset".to_string()));
        }
        self.inner.archive_batch(ids, cutoff).await
    }
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn existing_chat_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        self.inner.existing_chat_ids(cabinet_id, external_ids).await
    }

    async fn insert_chats(&self, chats: Vec<NewChat>) -> Result<u64, StoreError> {
        self.inner.insert_chats(chats).await
    }

    async fn refresh_chat(&self, chat: &NewChat) -> Result<(), StoreError> {
        self.inner.refresh_chat(chat).await
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        self.inner.get_chat(id).await
    }

    async fn existing_message_keys(
        &self,
        cabinet_id: Uuid,
        event_ids: &[String],
    ) -> Result<HashSet<(String, String)>, StoreError> {
        self.inner.existing_message_keys(cabinet_id, event_ids).await
    }

    async fn insert_messages(
        &self,
        cabinet_id: Uuid,
        messages: Vec<NewChatMessage>,
    ) -> Result<u64, StoreError> {
        self.inner.insert_messages(cabinet_id, messages).await
    }

    async fn record_outbound(&self, chat_id: Uuid, text: &str) -> Result<ChatMessage, StoreError> {
        self.inner.record_outbound(chat_id, text).await
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn create_pending(
        &self,
        user_id: Uuid,
        amount: i64,
        tokens: i64,
    ) -> Result<Payment, StoreError> {
        self.inner.create_pending(user_id, amount, tokens).await
    }

    async fn find_by_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, StoreError> {
        self.inner.find_by_invoice(invoice_id).await
    }

    async fn settle(&self, invoice_id: i64, description: &str) -> Result<Settlement, StoreError> {
        self.inner.settle(invoice_id, description).await
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn apply_entry(&self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        self.inner.apply_entry(entry).await
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.inner.balance(user_id).await
    }

    async fn transactions_sum(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.inner.transactions_sum(user_id).await
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.list_transactions(user_id, transaction_type).await
    }
}

#[tokio::test]
async fn test_rejected_key_error_survives_failed_invalidation() {
    let h = Harness::new().await;
    h.fund(3).await;
    *h.marketplace.reply_error.lock().unwrap() = Some(UpstreamError::Status {
        status: 401,
        body: "unauthorized".to_string(),
    });
    let mut review = review(h.cabinet.id, ReviewStatus::Pending, 5);
    review.ai_draft = Some("Спасибо!".to_string());
    h.store.insert_review(review.clone()).await;

    let flaky: Arc<dyn Store> = Arc::new(FlakyStore {
        fail_invalidate: true,
        ..FlakyStore::wrap(&h.store)
    });
    let err = ReplyDispatcher::new(flaky, h.marketplace.clone())
        .send_reply(review.id, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Upstream(UpstreamError::Status { status: 401, .. })
    ));
    assert_eq!(h.store.balance(h.cabinet.user_id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_archival_failure_keeps_committed_batches() {
    let h = Harness::new().await;
    let old = Utc::now() - Duration::days(10);
    let mut stale = Vec::new();
    for _ in 0..5 {
        let r = review(h.cabinet.id, ReviewStatus::Sent, 5);
        h.store.insert_review(r.clone()).await;
        h.store.set_review_updated_at(r.id, old).await;
        stale.push(r.id);
    }

    let flaky: Arc<dyn Store> = Arc::new(FlakyStore {
        fail_batches_from: Some(2),
        ..FlakyStore::wrap(&h.store)
    });
    let archiver = Archiver::new(
        flaky,
        ArchivalConfig {
            batch_size: 2,
            ..ArchivalConfig::default()
        },
    );

    let err = archiver.run().await.unwrap_err();
    assert_eq!(err.archived, 2);
    assert!(matches!(err.source, StoreError::Database(_)));

    let mut archived = 0;
    for id in &stale {
        let status = h.store.get_review(*id).await.unwrap().unwrap().status;
        if status == ReviewStatus::Archived {
            archived += 1;
        } else {
            assert_eq!(status, ReviewStatus::Sent);
        }
    }
    assert_eq!(archived, 2);

    // The next run picks up where the failed one stopped
    let retry = Archiver::new(
        h.dyn_store(),
        ArchivalConfig {
            batch_size: 2,
            ..ArchivalConfig::default()
        },
    );
    assert_eq!(retry.run().await.unwrap().archived, 3);
}

#[tokio::test]
async fn test_admin_override_bypasses_state_machine() {
    let h = Harness::new().await;
    let review = review(h.cabinet.id, ReviewStatus::Archived, 5);
    h.store.insert_review(review.clone()).await;

    let service = ReviewService::new(h.dyn_store());
    let updated = service
        .override_status(review.id, ReviewStatus::New, Uuid::new_v4())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, ReviewStatus::New);

    let missing = service
        .override_status(Uuid::new_v4(), ReviewStatus::New, Uuid::new_v4())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_list_reviews_filters_by_status() {
    let h = Harness::new().await;
    h.store
        .insert_review(review(h.cabinet.id, ReviewStatus::New, 5))
        .await;
    h.store
        .insert_review(review(h.cabinet.id, ReviewStatus::Sent, 5))
        .await;
    h.store
        .insert_review(review(Uuid::new_v4(), ReviewStatus::New, 5))
        .await;

    let service = ReviewService::new(h.dyn_store());
    assert_eq!(service.list_reviews(h.cabinet.id, None).await.unwrap().len(), 2);
    let new_only = service
        .list_reviews(h.cabinet.id, Some(ReviewStatus::New))
        .await
        .unwrap();
    assert_eq!(new_only.len(), 1);
    assert_eq!(new_only[0].status, ReviewStatus::New);
}
