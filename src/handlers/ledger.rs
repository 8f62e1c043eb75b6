//! Token balance and transaction history

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, AuthenticatedUser};
use crate::error::ApiError;
use crate::ledger::BalanceCheck;
use crate::models::{ApiResponse, Transaction, TransactionType};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustmentRequest {
    pub user_id: Uuid,
    pub amount: i64,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
}

/// GET /api/balance
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let balance = state.ledger.balance(user.user_id).await?;
    Ok(Json(ApiResponse::ok(BalanceResponse {
        user_id: user.user_id,
        balance,
    })))
}

/// GET /api/transactions?type=
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, ApiError> {
    let transactions = state
        .ledger
        .list_transactions(user.user_id, query.transaction_type)
        .await?;
    Ok(Json(ApiResponse::ok(transactions)))
}

/// POST /api/admin/ledger/adjust
pub async fn adjust_balance(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<AdjustmentRequest>,
) -> Result<Json<ApiResponse<Transaction>>, ApiError> {
    request.validate()?;

    let transaction = state
        .ledger
        .adjust(request.user_id, request.amount, request.description)
        .await?;

    tracing::warn!(
        target: "audit",
        admin_id = %admin.user_id,
        user_id = %request.user_id,
        amount = request.amount,
        balance_after = transaction.balance_after,
        "Balance adjusted"
    );

    Ok(Json(ApiResponse::ok(transaction)))
}

/// GET /api/admin/ledger/:user_id/verify
pub async fn verify_balance(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<BalanceCheck>>, ApiError> {
    let check = state.ledger.verify_balance(user_id).await?;
    Ok(Json(ApiResponse::ok(check)))
}
