//! Centralized API error handling for ReviewDesk
//!
//! Every subsystem error converts into `ApiError`, which maps to an HTTP
//! status and a JSON body of the form `{"error": {"code", "message", "details"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ai::GenerationError;
use crate::chats::ChatError;
use crate::ledger::LedgerError;
use crate::payments::{PaymentError, WebhookError};
use crate::reviews::{DispatchError, TransitionError};
use crate::store::StoreError;
use crate::sync::SyncError;
use crate::upstream::UpstreamError;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::PaymentRequired(_) => "INSUFFICIENT_BALANCE",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        match &self {
            ApiError::InternalError(_)
            | ApiError::DatabaseError(_)
            | ApiError::ServiceUnavailable(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            ApiError::ExternalServiceError(_) => {
                tracing::warn!(error = %message, code = %error_code, "Upstream error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance { .. } => ApiError::PaymentRequired(err.to_string()),
            StoreError::Database(msg) => ApiError::DatabaseError(msg),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::ExternalServiceError(err.to_string())
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { .. } => ApiError::PaymentRequired(err.to_string()),
            LedgerError::InvalidAmount(_) => ApiError::ValidationError(err.to_string()),
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::CabinetNotFound(_) => ApiError::NotFound(err.to_string()),
            SyncError::MissingCredential(_) => ApiError::Unauthorized(err.to_string()),
            SyncError::Upstream { .. } => ApiError::ExternalServiceError(err.to_string()),
            SyncError::Store(e) => e.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ReviewNotFound(_) | DispatchError::CabinetNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            DispatchError::EmptyText => ApiError::ValidationError(err.to_string()),
            DispatchError::MissingCredential(_) => ApiError::Unauthorized(err.to_string()),
            DispatchError::InsufficientBalance { .. } => ApiError::PaymentRequired(err.to_string()),
            DispatchError::InvalidTransition(e) => e.into(),
            DispatchError::Upstream(e) => e.into(),
            DispatchError::Store(e) => e.into(),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Configuration => ApiError::ServiceUnavailable(err.to_string()),
            GenerationError::ReviewNotFound(_) | GenerationError::CabinetNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            GenerationError::EmptyGeneration => ApiError::ExternalServiceError(err.to_string()),
            GenerationError::InvalidTransition(e) => e.into(),
            GenerationError::Upstream(e) => e.into(),
            GenerationError::Store(e) => e.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong { .. } => {
                ApiError::ValidationError(err.to_string())
            }
            ChatError::ChatNotFound(_) | ChatError::CabinetNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ChatError::MissingReplySign(_) => ApiError::Conflict(err.to_string()),
            ChatError::MissingCredential(_) => ApiError::Unauthorized(err.to_string()),
            ChatError::Upstream(e) => e.into(),
            ChatError::Store(e) => e.into(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Configuration => ApiError::ServiceUnavailable(err.to_string()),
            PaymentError::Unauthorized => ApiError::Unauthorized(err.to_string()),
            PaymentError::InvalidRequest(_) => ApiError::ValidationError(err.to_string()),
            PaymentError::Store(e) => e.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Configuration => ApiError::ServiceUnavailable(err.to_string()),
            WebhookError::Malformed(_) | WebhookError::AmountMismatch { .. } => {
                ApiError::ValidationError(err.to_string())
            }
            WebhookError::InvalidSignature => ApiError::Unauthorized(err.to_string()),
            WebhookError::PaymentNotFound(_) => ApiError::NotFound(err.to_string()),
            WebhookError::Store(e) => e.into(),
        }
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
