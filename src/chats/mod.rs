//! Outbound buyer chat messages

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::marketplace::{MarketplaceApi, MAX_CHAT_MESSAGE_LEN};
use crate::models::ChatMessage;
use crate::store::{Store, StoreError};
use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Message is {length} characters, the limit is {max}")]
    MessageTooLong { length: usize, max: usize },

    #[error("Chat {0} not found")]
    ChatNotFound(Uuid),

    #[error("Cabinet {0} not found")]
    CabinetNotFound(Uuid),

    #[error("Chat {0} has no reply sign")]
    MissingReplySign(Uuid),

    #[error("Cabinet {0} has no valid marketplace API key")]
    MissingCredential(Uuid),

    #[error("Marketplace error: {0}")]
    Upstream(UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Trimmed text, or the reason it cannot be sent
pub fn validate_message(text: &str) -> Result<&str, ChatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    let length = text.chars().count();
    if length > MAX_CHAT_MESSAGE_LEN {
        return Err(ChatError::MessageTooLong {
            length,
            max: MAX_CHAT_MESSAGE_LEN,
        });
    }
    Ok(text)
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Store>,
    marketplace: Arc<dyn MarketplaceApi>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, marketplace: Arc<dyn MarketplaceApi>) -> Self {
        Self { store, marketplace }
    }

    /// Post a seller message; recorded locally only after the provider accepts it
    pub async fn send_message(&self, chat_id: Uuid, text: &str) -> Result<ChatMessage, ChatError> {
        let text = validate_message(text)?;

        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound(chat_id))?;
        let reply_sign = chat
            .reply_sign
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ChatError::MissingReplySign(chat_id))?;

        let cabinet = self
            .store
            .get_cabinet(chat.cabinet_id)
            .await?
            .ok_or(ChatError::CabinetNotFound(chat.cabinet_id))?;
        let key = cabinet
            .usable_api_key()
            .ok_or(ChatError::MissingCredential(cabinet.id))?;

        if let Err(e) = self.marketplace.send_chat_message(key, reply_sign, text).await {
            if e.is_unauthorized() {
                tracing::warn!(cabinet_id = %cabinet.id, "Marketplace rejected API key, marking invalid");
                if let Err(store_err) = self.store.invalidate_api_key(cabinet.id).await {
                    tracing::error!(cabinet_id = %cabinet.id, error = %store_err, "Failed to mark API key invalid");
                }
            }
            tracing::warn!(chat_id = %chat_id, error = %e, "Chat message rejected upstream");
            return Err(ChatError::Upstream(e));
        }

        let message = self.store.record_outbound(chat_id, text).await?;
        tracing::info!(chat_id = %chat_id, message_id = %message.id, "Chat message sent");
        Ok(message)
    }
}
