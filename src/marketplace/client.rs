//! reqwest implementation of the marketplace API

use async_trait::async_trait;
use reqwest::{multipart, Client};

use super::types::{
    ChatInfo, ChatsResponse, EventsPage, EventsResponse, Feedback, FeedbackReply,
    FeedbacksResponse,
};
use super::MarketplaceApi;
use crate::config::MarketplaceConfig;
use crate::upstream::{ensure_success, UpstreamError};

/// HTTP client for the feedbacks and buyer-chat APIs.
///
/// Stateless apart from the connection pool. Never retries; callers decide.
#[derive(Clone)]
pub struct HttpMarketplaceClient {
    client: Client,
    feedbacks_url: String,
    chat_url: String,
}

impl HttpMarketplaceClient {
    pub fn new(config: &MarketplaceConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            feedbacks_url: config.feedbacks_url.trim_end_matches('/').to_string(),
            chat_url: config.chat_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceClient {
    async fn fetch_reviews_page(
        &self,
        api_key: &str,
        is_answered: bool,
        skip: u32,
        take: u32,
    ) -> Result<Vec<Feedback>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/feedbacks", self.feedbacks_url))
            .header("Authorization", api_key)
            .query(&[
                ("isAnswered", is_answered.to_string()),
                ("take", take.to_string()),
                ("skip", skip.to_string()),
                ("order", "dateDesc".to_string()),
            ])
            .send()
            .await?;

        let body: FeedbacksResponse = ensure_success(response).await?.json().await?;

        if body.error.unwrap_or(false) {
            return Err(UpstreamError::Status {
                status: 200,
                body: body.error_text.unwrap_or_default(),
            });
        }

        Ok(body.data.map(|d| d.feedbacks).unwrap_or_default())
    }

    async fn fetch_chats_page(
        &self,
        api_key: &str,
        skip: u32,
        take: u32,
    ) -> Result<Vec<ChatInfo>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/seller/chats", self.chat_url))
            .header("Authorization", api_key)
            .query(&[("take", take.to_string()), ("skip", skip.to_string())])
            .send()
            .await?;

        let body: ChatsResponse = ensure_success(response).await?.json().await?;
        Ok(body.result)
    }

    async fn fetch_chat_events(
        &self,
        api_key: &str,
        next: Option<i64>,
    ) -> Result<EventsPage, UpstreamError> {
        let mut request = self
            .client
            .get(format!("{}/seller/events", self.chat_url))
            .header("Authorization", api_key);
        if let Some(next) = next {
            request = request.query(&[("next", next)]);
        }

        let body: EventsResponse = ensure_success(request.send().await?).await?.json().await?;
        Ok(body.result.unwrap_or_default())
    }

    async fn send_reply_to_review(
        &self,
        api_key: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        let response = self
            .client
            .patch(format!("{}/feedbacks", self.feedbacks_url))
            .header("Authorization", api_key)
            .json(&FeedbackReply {
                id: external_id,
                text,
            })
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    async fn send_chat_message(
        &self,
        api_key: &str,
        reply_sign: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        let form = multipart::Form::new()
            .text("replySign", reply_sign.to_string())
            .text("message", text.to_string());

        let response = self
            .client
            .post(format!("{}/seller/message", self.chat_url))
            .header("Authorization", api_key)
            .multipart(form)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}
