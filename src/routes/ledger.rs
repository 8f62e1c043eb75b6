//! Balance and transaction route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/api/balance", get(get_balance))
        .route("/api/transactions", get(list_transactions))
        .route("/api/admin/ledger/adjust", post(adjust_balance))
        .route("/api/admin/ledger/:user_id/verify", get(verify_balance))
}
