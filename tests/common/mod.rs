//! Shared fixtures and scripted upstream clients for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use reviewdesk_server::ai::{CompletionApi, CompletionRequest};
use reviewdesk_server::config::{CompletionConfig, GatewayConfig, MarketplaceConfig};
use reviewdesk_server::marketplace::types::{EventMessage, LastMessage};
use reviewdesk_server::marketplace::{ChatEvent, ChatInfo, EventsPage, Feedback, MarketplaceApi};
use reviewdesk_server::models::{Cabinet, Review, ReviewStatus};
use reviewdesk_server::payments::HashAlgorithm;
use reviewdesk_server::store::MemoryStore;
use reviewdesk_server::upstream::UpstreamError;

pub const API_KEY: &str = "wb-key";

/// Marketplace double serving fixed listings and recording outbound calls
#[derive(Default)]
pub struct FakeMarketplace {
    pub feedbacks: Mutex<Vec<Feedback>>,
    pub chats: Mutex<Vec<ChatInfo>>,
    /// Served in order, one per events call
    pub event_pages: Mutex<Vec<EventsPage>>,
    /// Fail the feedback listing at this `skip` offset
    pub fail_feedbacks_at: Mutex<Option<(u32, UpstreamError)>>,
    pub reply_error: Mutex<Option<UpstreamError>>,
    pub message_error: Mutex<Option<UpstreamError>>,
    pub sent_replies: Mutex<Vec<(String, String)>>,
    pub sent_messages: Mutex<Vec<(String, String)>>,
    pub feedback_requests: Mutex<Vec<(bool, u32, u32)>>,
    events_served: Mutex<usize>,
}

impl FakeMarketplace {
    pub fn with_feedbacks(feedbacks: Vec<Feedback>) -> Self {
        Self {
            feedbacks: Mutex::new(feedbacks),
            ..Self::default()
        }
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.sent_replies.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketplaceApi for FakeMarketplace {
    async fn fetch_reviews_page(
        &self,
        _api_key: &str,
        is_answered: bool,
        skip: u32,
        take: u32,
    ) -> Result<Vec<Feedback>, UpstreamError> {
        self.feedback_requests
            .lock()
            .unwrap()
            .push((is_answered, skip, take));

        if let Some((at, err)) = self.fail_feedbacks_at.lock().unwrap().clone() {
            if skip >= at {
                return Err(err);
            }
        }

        let all = self.feedbacks.lock().unwrap();
        Ok(all
            .iter()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }

    async fn fetch_chats_page(
        &self,
        _api_key: &str,
        skip: u32,
        take: u32,
    ) -> Result<Vec<ChatInfo>, UpstreamError> {
        let all = self.chats.lock().unwrap();
        Ok(all
            .iter()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }

    async fn fetch_chat_events(
        &self,
        _api_key: &str,
        _next: Option<i64>,
    ) -> Result<EventsPage, UpstreamError> {
        let mut served = self.events_served.lock().unwrap();
        let pages = self.event_pages.lock().unwrap();
        let page = pages.get(*served).cloned().unwrap_or_default();
        *served += 1;
        Ok(page)
    }

    async fn send_reply_to_review(
        &self,
        _api_key: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        if let Some(err) = self.reply_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.sent_replies
            .lock()
            .unwrap()
            .push((external_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_chat_message(
        &self,
        _api_key: &str,
        reply_sign: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        if let Some(err) = self.message_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.sent_messages
            .lock()
            .unwrap()
            .push((reply_sign.to_string(), text.to_string()));
        Ok(())
    }
}

/// Completion double returning a fixed answer
pub struct FakeCompletion {
    pub answer: Mutex<Result<String, UpstreamError>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Mutex::new(Ok(text.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: UpstreamError) -> Self {
        Self {
            answer: Mutex::new(Err(err)),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionApi for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.lock().unwrap().clone()
    }
}

pub fn marketplace_config(page_size: u32) -> MarketplaceConfig {
    MarketplaceConfig {
        page_size,
        page_delay: Duration::ZERO,
        ..MarketplaceConfig::default()
    }
}

pub fn completion_config() -> CompletionConfig {
    CompletionConfig {
        api_key: Some("test".to_string()),
        default_prompt: "Отвечай вежливо.".to_string(),
        ..CompletionConfig::default()
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        merchant_login: "shop".to_string(),
        password1: "secret1".to_string(),
        password2: "secret2".to_string(),
        is_test: true,
        base_url: "https://gateway.example/Merchant/Index.aspx".to_string(),
        hash_algorithm: HashAlgorithm::Sha256,
    }
}

pub fn cabinet(user_id: Uuid) -> Cabinet {
    Cabinet {
        id: Uuid::new_v4(),
        user_id,
        name: "Main shop".to_string(),
        api_key: Some(API_KEY.to_string()),
        api_key_valid: true,
        prompt_rules: None,
        prompt_examples: None,
        auto_reply_enabled: false,
        auto_reply_min_rating: 4,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn review(cabinet_id: Uuid, status: ReviewStatus, rating: i16) -> Review {
    let now = Utc::now();
    Review {
        id: Uuid::new_v4(),
        cabinet_id,
        external_id: format!("fb-{}", Uuid::new_v4().simple()),
        rating,
        author_name: Some("Анна".to_string()),
        text: Some("Отличный товар".to_string()),
        pros: None,
        cons: None,
        product_name: Some("Кружка".to_string()),
        product_article: Some("MUG-1".to_string()),
        photo_urls: Vec::new(),
        has_video: false,
        status,
        ai_draft: None,
        sent_answer: None,
        review_created_at: now,
        created_at: now,
        updated_at: now,
    }
}

pub fn feedback(id: &str, rating: i16) -> Feedback {
    Feedback {
        id: Some(id.to_string()),
        user_name: Some("Покупатель".to_string()),
        text: Some("Всё хорошо".to_string()),
        product_valuation: Some(rating),
        created_date: Some(Utc::now()),
        ..Feedback::default()
    }
}

pub fn feedbacks(prefix: &str, count: usize) -> Vec<Feedback> {
    (0..count)
        .map(|i| feedback(&format!("{}-{}", prefix, i), 5))
        .collect()
}

pub fn chat_info(id: &str, reply_sign: &str) -> ChatInfo {
    ChatInfo {
        chat_id: Some(id.to_string()),
        reply_sign: Some(reply_sign.to_string()),
        client_name: Some("Покупатель".to_string()),
        last_message: Some(LastMessage {
            text: Some("Здравствуйте".to_string()),
            add_timestamp: Some(1_700_000_000_000),
        }),
        is_read: Some(false),
        ..ChatInfo::default()
    }
}

pub fn chat_event(chat_id: &str, event_id: &str, text: &str) -> ChatEvent {
    ChatEvent {
        chat_id: Some(chat_id.to_string()),
        event_id: Some(event_id.to_string()),
        event_type: Some("message".to_string()),
        sender: Some("client".to_string()),
        add_timestamp: Some(1_700_000_000_000),
        message: Some(EventMessage {
            text: Some(text.to_string()),
            attachments: None,
        }),
    }
}

/// Store holding one cabinet owned by `user_id`
pub async fn store_with_cabinet(user_id: Uuid) -> (Arc<MemoryStore>, Cabinet) {
    let store = Arc::new(MemoryStore::new());
    let cabinet = cabinet(user_id);
    store.insert_cabinet(cabinet.clone()).await;
    (store, cabinet)
}
