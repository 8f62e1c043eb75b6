//! Conversion from marketplace wire types into mirror rows

use chrono::Utc;
use uuid::Uuid;

use crate::marketplace::types::from_millis;
use crate::marketplace::{ChatEvent, ChatInfo, Feedback};
use crate::models::{NewChat, NewChatMessage, NewReview, ReviewStatus, SenderRole};

/// Build a review row. Items without an id or a 1..=5 rating are skipped.
pub fn review_from_feedback(
    cabinet_id: Uuid,
    feedback: &Feedback,
    answered: bool,
) -> Option<NewReview> {
    let external_id = feedback.id.clone().filter(|id| !id.is_empty())?;
    let rating = feedback.product_valuation.filter(|r| (1..=5).contains(r))?;
    let details = feedback.product_details.clone().unwrap_or_default();

    let (status, sent_answer) = if answered {
        (ReviewStatus::Answered, feedback.answer_text())
    } else {
        (ReviewStatus::New, None)
    };

    Some(NewReview {
        cabinet_id,
        external_id,
        rating,
        author_name: feedback.user_name.clone(),
        text: feedback.text.clone(),
        pros: feedback.pros.clone(),
        cons: feedback.cons.clone(),
        product_name: details.product_name,
        product_article: details
            .supplier_article
            .or_else(|| details.nm_id.map(|id| id.to_string())),
        photo_urls: feedback.photo_urls(),
        has_video: feedback.has_video(),
        status,
        sent_answer,
        review_created_at: feedback.created_date.unwrap_or_else(Utc::now),
    })
}

pub fn chat_from_info(cabinet_id: Uuid, info: &ChatInfo) -> Option<NewChat> {
    let external_id = info.chat_id.clone().filter(|id| !id.is_empty())?;
    let card = info.good_card.clone().unwrap_or_default();
    let last = info.last_message.clone().unwrap_or_default();

    Some(NewChat {
        cabinet_id,
        external_id,
        client_name: info.client_name.clone(),
        product_name: card.name.or_else(|| card.nm_id.map(|id| id.to_string())),
        last_message_text: last.text,
        last_message_at: last.add_timestamp.and_then(from_millis),
        is_read: info.is_read.unwrap_or(false),
        reply_sign: info.reply_sign.clone(),
    })
}

/// Message row for a `message` event; other event kinds are ignored
pub fn message_from_event(event: &ChatEvent) -> Option<NewChatMessage> {
    if !event.is_message() {
        return None;
    }
    let chat_external_id = event.chat_id.clone()?;
    let event_id = event.event_id.clone()?;

    let sender = match event.sender.as_deref() {
        Some("seller") => SenderRole::Seller,
        _ => SenderRole::Buyer,
    };

    Some(NewChatMessage {
        chat_external_id,
        sender,
        text: event.message.as_ref().and_then(|m| m.text.clone()),
        attachments: event.attachment_urls(),
        event_id: Some(event_id),
        sent_at: event
            .add_timestamp
            .and_then(from_millis)
            .unwrap_or_else(Utc::now),
    })
}
