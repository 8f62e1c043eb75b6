//! Token purchase and gateway result callback

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    Form, Json,
};
use serde::Deserialize;
use validator::Validate;

use super::OptionalUser;
use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::payments::{PaymentLink, ResultNotification};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(range(min = 1))]
    pub tokens: i64,
}

/// POST /api/payments
///
/// Authentication is checked after gateway configuration so an unconfigured
/// deployment reports 503 to everyone.
pub async fn create_payment(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentLink>>), ApiError> {
    request.validate()?;

    let link = state
        .payment_service
        .create_payment(user.map(|u| u.user_id), request.amount, request.tokens)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(link))))
}

/// GET|POST /api/payments/result
///
/// Accepts the notification as a query string, a urlencoded form or JSON and
/// answers with the plain-text `OK{InvId}` the gateway expects.
pub async fn payment_result(
    State(state): State<AppState>,
    request: Request,
) -> Result<String, ApiError> {
    let notification = extract_notification(request).await?;
    let outcome = state.payment_service.handle_result(&notification).await?;
    Ok(outcome.acknowledgement())
}

async fn extract_notification(request: Request) -> Result<ResultNotification, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let Json(notification) = Json::<ResultNotification>::from_request(request, &())
            .await
            .map_err(|e| ApiError::ValidationError(e.body_text()))?;
        return Ok(notification);
    }

    if request.method() == Method::GET || content_type.is_empty() {
        let Query(notification) = Query::<ResultNotification>::try_from_uri(request.uri())
            .map_err(|e| ApiError::ValidationError(e.body_text()))?;
        return Ok(notification);
    }

    let Form(notification) = Form::<ResultNotification>::from_request(request, &())
        .await
        .map_err(|e| ApiError::ValidationError(e.body_text()))?;
    Ok(notification)
}
