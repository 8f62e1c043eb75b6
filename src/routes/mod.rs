//! Route definitions for ReviewDesk API

mod cabinets;
mod chats;
mod ledger;
mod payments;
mod reviews;

pub use cabinets::cabinet_routes;
pub use chats::chat_routes;
pub use ledger::ledger_routes;
pub use payments::payment_routes;
pub use reviews::review_routes;

use axum::{routing::get, Router};

use crate::handlers::health_check;
use crate::state::AppState;

/// Every route, without middleware layers
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(cabinet_routes())
        .merge(review_routes())
        .merge(chat_routes())
        .merge(payment_routes())
        .merge(ledger_routes())
}
