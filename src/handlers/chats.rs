//! Chat endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{authorize_cabinet, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{ApiResponse, ChatMessage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// POST /api/chats/:id/messages
///
/// Length and emptiness are checked by the chat service so the limit is
/// counted in characters after trimming.
pub async fn send_chat_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>), ApiError> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Chat {} not found", chat_id)))?;
    authorize_cabinet(state.store.as_ref(), &user, chat.cabinet_id).await?;

    let message = state.chat_service.send_message(chat_id, &request.text).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}
