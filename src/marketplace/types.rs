//! Wire types of the marketplace feedback and chat APIs.
//!
//! Every field is optional: the provider omits keys freely and the mirror
//! must not fail a whole page over one odd item.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// `GET /feedbacks` envelope
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbacksResponse {
    pub data: Option<FeedbacksData>,
    pub error: Option<bool>,
    pub error_text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbacksData {
    #[serde(default)]
    pub feedbacks: Vec<Feedback>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Option<String>,
    pub user_name: Option<String>,
    pub text: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub product_valuation: Option<i16>,
    pub created_date: Option<DateTime<Utc>>,
    pub answer: Option<FeedbackAnswer>,
    pub product_details: Option<ProductDetails>,
    pub photo_links: Option<Vec<PhotoLink>>,
    pub video: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FeedbackAnswer {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub product_name: Option<String>,
    pub supplier_article: Option<String>,
    pub nm_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhotoLink {
    pub full_size: Option<String>,
    pub mini_size: Option<String>,
}

impl Feedback {
    pub fn photo_urls(&self) -> Vec<String> {
        self.photo_links
            .iter()
            .flatten()
            .filter_map(|p| p.full_size.clone().or_else(|| p.mini_size.clone()))
            .collect()
    }

    pub fn has_video(&self) -> bool {
        matches!(&self.video, Some(v) if !v.is_null())
    }

    pub fn answer_text(&self) -> Option<String> {
        self.answer
            .as_ref()
            .and_then(|a| a.text.clone())
            .filter(|t| !t.trim().is_empty())
    }
}

/// `PATCH /feedbacks` body
#[derive(Debug, Serialize)]
pub struct FeedbackReply<'a> {
    pub id: &'a str,
    pub text: &'a str,
}

/// `GET /seller/chats` envelope
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ChatsResponse {
    #[serde(default)]
    pub result: Vec<ChatInfo>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    #[serde(rename = "chatID")]
    pub chat_id: Option<String>,
    pub reply_sign: Option<String>,
    pub client_name: Option<String>,
    pub good_card: Option<GoodCard>,
    pub last_message: Option<LastMessage>,
    pub is_read: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GoodCard {
    pub name: Option<String>,
    #[serde(rename = "nmID")]
    pub nm_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: Option<String>,
    /// Milliseconds since the epoch
    pub add_timestamp: Option<i64>,
}

/// `GET /seller/events` envelope
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct EventsResponse {
    pub result: Option<EventsPage>,
}

/// One page of the chat events feed
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    /// Cursor for the following page
    pub next: Option<i64>,
    #[serde(default)]
    pub events: Vec<ChatEvent>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "chatID")]
    pub chat_id: Option<String>,
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    /// `client` or `seller`
    pub sender: Option<String>,
    pub add_timestamp: Option<i64>,
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EventMessage {
    pub text: Option<String>,
    pub attachments: Option<EventAttachments>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EventAttachments {
    #[serde(default)]
    pub images: Vec<AttachmentLink>,
    #[serde(default)]
    pub files: Vec<AttachmentLink>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AttachmentLink {
    pub url: Option<String>,
}

impl ChatEvent {
    pub fn is_message(&self) -> bool {
        self.event_type.as_deref().map_or(true, |t| t == "message")
    }

    pub fn attachment_urls(&self) -> Vec<String> {
        self.message
            .as_ref()
            .and_then(|m| m.attachments.as_ref())
            .map(|a| {
                a.images
                    .iter()
                    .chain(a.files.iter())
                    .filter_map(|l| l.url.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Epoch milliseconds as delivered by the chat API
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
