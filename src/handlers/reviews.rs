//! Review endpoints: listing, drafts, replies and admin overrides

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{authorize_cabinet, AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::{ApiResponse, Review, ReviewStatus};
use crate::reviews::DispatchOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub status: Option<ReviewStatus>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SendReplyRequest {
    /// Overrides the stored draft when present
    #[validate(length(max = 5000))]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusOverrideRequest {
    pub status: ReviewStatus,
}

async fn authorize_review(
    state: &AppState,
    user: &AuthenticatedUser,
    review_id: Uuid,
) -> Result<Review, ApiError> {
    let review = state
        .review_service
        .get_review(review_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Review {} not found", review_id)))?;
    authorize_cabinet(state.store.as_ref(), user, review.cabinet_id).await?;
    Ok(review)
}

/// GET /api/cabinets/:id/reviews?status=
pub async fn list_reviews(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cabinet_id): Path<Uuid>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<ApiResponse<Vec<Review>>>, ApiError> {
    authorize_cabinet(state.store.as_ref(), &user, cabinet_id).await?;

    let reviews = state
        .review_service
        .list_reviews(cabinet_id, query.status)
        .await?;
    Ok(Json(ApiResponse::ok(reviews)))
}

/// POST /api/reviews/:id/draft
pub async fn generate_draft(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Review>>, ApiError> {
    authorize_review(&state, &user, review_id).await?;

    let review = state.generator.generate_draft(review_id).await?;
    Ok(Json(ApiResponse::ok(review)))
}

/// POST /api/reviews/:id/reply
pub async fn send_reply(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<Uuid>,
    body: Option<Json<SendReplyRequest>>,
) -> Result<Json<ApiResponse<DispatchOutcome>>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    request.validate()?;

    authorize_review(&state, &user, review_id).await?;

    let outcome = state.dispatcher.send_reply(review_id, request.text).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// PUT /api/reviews/:id/status (admin only)
pub async fn override_review_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(review_id): Path<Uuid>,
    Json(request): Json<StatusOverrideRequest>,
) -> Result<Json<ApiResponse<Review>>, ApiError> {
    let review = state
        .review_service
        .override_status(review_id, request.status, admin.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Review {} not found", review_id)))?;

    Ok(Json(ApiResponse::ok(review)))
}
