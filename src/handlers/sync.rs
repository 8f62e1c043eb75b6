//! Marketplace sync and auto-reply triggers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{authorize_cabinet, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::reviews::AutoReplyReport;
use crate::state::AppState;
use crate::sync::{ChatSyncReport, FeedbackScope, SyncReport};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    Archive,
    #[default]
    Unanswered,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewSyncQuery {
    #[serde(default)]
    pub scope: SyncScope,
}

/// POST /api/cabinets/:id/sync/reviews?scope=archive|unanswered
pub async fn sync_reviews(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cabinet_id): Path<Uuid>,
    Query(query): Query<ReviewSyncQuery>,
) -> Result<Json<ApiResponse<SyncReport>>, ApiError> {
    authorize_cabinet(state.store.as_ref(), &user, cabinet_id).await?;

    let scope = match query.scope {
        SyncScope::Archive => FeedbackScope::Archive,
        SyncScope::Unanswered => FeedbackScope::Unanswered,
    };
    let report = state.reconciler.sync_feedbacks(cabinet_id, scope).await?;

    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/cabinets/:id/sync/chats
pub async fn sync_chats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cabinet_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ChatSyncReport>>, ApiError> {
    authorize_cabinet(state.store.as_ref(), &user, cabinet_id).await?;

    let report = state.reconciler.run_chat_sync(cabinet_id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/cabinets/:id/auto-replies
pub async fn run_auto_replies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cabinet_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AutoReplyReport>>, ApiError> {
    authorize_cabinet(state.store.as_ref(), &user, cabinet_id).await?;

    let report = state.auto_replier.run_auto_replies(cabinet_id).await?;
    Ok(Json(ApiResponse::ok(report)))
}
