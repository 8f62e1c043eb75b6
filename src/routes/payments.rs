//! Payment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments", post(create_payment))
        .route(
            "/api/payments/result",
            get(payment_result).post(payment_result),
        )
}
