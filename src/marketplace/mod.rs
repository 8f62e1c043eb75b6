//! Marketplace client
//!
//! Paged access to the seller's feedbacks, chats and chat events, plus the
//! two outbound actions (answer a feedback, post a chat message). Pure I/O:
//! nothing here touches the store.

mod client;
pub mod types;

pub use client::HttpMarketplaceClient;
pub use types::{ChatEvent, ChatInfo, EventsPage, Feedback};

use async_trait::async_trait;

use crate::upstream::UpstreamError;

/// Maximum chat message length accepted by the provider
pub const MAX_CHAT_MESSAGE_LEN: usize = 1000;

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// One page of feedbacks, answered or unanswered
    async fn fetch_reviews_page(
        &self,
        api_key: &str,
        is_answered: bool,
        skip: u32,
        take: u32,
    ) -> Result<Vec<Feedback>, UpstreamError>;

    async fn fetch_chats_page(
        &self,
        api_key: &str,
        skip: u32,
        take: u32,
    ) -> Result<Vec<ChatInfo>, UpstreamError>;

    /// One page of the chat events feed starting at cursor `next`
    async fn fetch_chat_events(
        &self,
        api_key: &str,
        next: Option<i64>,
    ) -> Result<EventsPage, UpstreamError>;

    async fn send_reply_to_review(
        &self,
        api_key: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError>;

    async fn send_chat_message(
        &self,
        api_key: &str,
        reply_sign: &str,
        text: &str,
    ) -> Result<(), UpstreamError>;
}
