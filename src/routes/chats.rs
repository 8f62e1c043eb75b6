//! Chat route definitions

use axum::{routing::post, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/api/chats/:id/messages", post(send_chat_message))
}
