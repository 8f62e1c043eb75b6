//! Review route definitions

use axum::{
    routing::{post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/api/reviews/:id/draft", post(generate_draft))
        .route("/api/reviews/:id/reply", post(send_reply))
        .route("/api/reviews/:id/status", put(override_review_status))
}
