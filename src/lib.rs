//! ReviewDesk Backend Library
//!
//! Marketplace review and chat mirroring, AI-drafted replies, a token ledger
//! and payment gateway settlement, exposed over an axum API.

pub mod ai;
pub mod auth;
pub mod chats;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod marketplace;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod upstream;

use axum::{middleware as axum_middleware, Router};
use tower_http::cors::CorsLayer;

use state::AppState;

/// Full application router with tracing and CORS layers
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    routes::api_router()
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::request_tracing))
        .layer(cors)
}
