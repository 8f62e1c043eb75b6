//! Per-cabinet sync and listing routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn cabinet_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cabinets/:id/sync/reviews", post(sync_reviews))
        .route("/api/cabinets/:id/sync/chats", post(sync_chats))
        .route("/api/cabinets/:id/auto-replies", post(run_auto_replies))
        .route("/api/cabinets/:id/reviews", get(list_reviews))
}
