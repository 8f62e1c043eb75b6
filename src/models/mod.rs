//! Data models for the ReviewDesk backend
//!
//! Mirrors of marketplace reviews and chats, payments and the token ledger.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// User roles carried in access tokens
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Seller,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Seller => "seller",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seller" => Some(UserRole::Seller),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// Cabinets and settings
// ============================================================================

/// Seller cabinet: marketplace credentials plus per-account prompt rules
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Cabinet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_key_valid: bool,
    pub prompt_rules: Option<String>,
    pub prompt_examples: Option<String>,
    pub auto_reply_enabled: bool,
    pub auto_reply_min_rating: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cabinet {
    /// Marketplace key if present and not revoked
    pub fn usable_api_key(&self) -> Option<&str> {
        match &self.api_key {
            Some(key) if self.api_key_valid && !key.trim().is_empty() => Some(key.as_str()),
            _ => None,
        }
    }
}

/// Global generation settings (single row, resolved once per operation)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, Default)]
pub struct PromptSettings {
    pub default_prompt: Option<String>,
    pub model: Option<String>,
}

// ============================================================================
// Reviews
// ============================================================================

/// Review lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "review_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    New,
    Pending,
    Answered,
    Sent,
    Auto,
    Archived,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::New => "new",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Answered => "answered",
            ReviewStatus::Sent => "sent",
            ReviewStatus::Auto => "auto",
            ReviewStatus::Archived => "archived",
        }
    }
}

/// Mirrored marketplace review
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Review {
    pub id: Uuid,
    pub cabinet_id: Uuid,
    pub external_id: String,
    pub rating: i16,
    pub author_name: Option<String>,
    pub text: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub product_name: Option<String>,
    pub product_article: Option<String>,
    pub photo_urls: Vec<String>,
    pub has_video: bool,
    pub status: ReviewStatus,
    pub ai_draft: Option<String>,
    pub sent_answer: Option<String>,
    pub review_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review row produced by the reconciler
#[derive(Debug, Clone)]
pub struct NewReview {
    pub cabinet_id: Uuid,
    pub external_id: String,
    pub rating: i16,
    pub author_name: Option<String>,
    pub text: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub product_name: Option<String>,
    pub product_article: Option<String>,
    pub photo_urls: Vec<String>,
    pub has_video: bool,
    pub status: ReviewStatus,
    pub sent_answer: Option<String>,
    pub review_created_at: DateTime<Utc>,
}

// ============================================================================
// Chats
// ============================================================================

/// Author side of a chat message
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "sender_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Seller,
    Buyer,
}

/// Mirrored buyer chat
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub cabinet_id: Uuid,
    pub external_id: String,
    pub client_name: Option<String>,
    pub product_name: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    #[serde(skip_serializing)]
    pub reply_sign: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chat row produced by the reconciler
#[derive(Debug, Clone)]
pub struct NewChat {
    pub cabinet_id: Uuid,
    pub external_id: String,
    pub client_name: Option<String>,
    pub product_name: Option<String>,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub reply_sign: Option<String>,
}

/// Single chat message
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: SenderRole,
    pub text: Option<String>,
    pub attachments: Vec<String>,
    pub event_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Message row keyed by the chat's external id, as delivered by the events feed
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub chat_external_id: String,
    pub sender: SenderRole,
    pub text: Option<String>,
    pub attachments: Vec<String>,
    pub event_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

// ============================================================================
// Payments and ledger
// ============================================================================

/// Payment status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

/// Token top-up invoice
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: i64,
    pub user_id: Uuid,
    pub amount: i64,
    pub tokens: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Ledger transaction types
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Bonus,
    Purchase,
    Usage,
    Admin,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Bonus => "bonus",
            TransactionType::Purchase => "purchase",
            TransactionType::Usage => "usage",
            TransactionType::Admin => "admin",
        }
    }
}

/// Ledger transaction (append-only)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry before it is applied
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub description: String,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
