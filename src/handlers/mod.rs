//! API handlers for ReviewDesk

pub mod chats;
pub mod health;
pub mod ledger;
pub mod payments;
pub mod reviews;
pub mod sync;

pub use chats::*;
pub use health::*;
pub use ledger::*;
pub use payments::*;
pub use reviews::*;
pub use sync::*;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser};

use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Cabinet;
use crate::store::Store;

/// Load a cabinet the caller may act on: its owner or an admin
pub(crate) async fn authorize_cabinet(
    store: &dyn Store,
    user: &AuthenticatedUser,
    cabinet_id: Uuid,
) -> Result<Cabinet, ApiError> {
    let cabinet = store
        .get_cabinet(cabinet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cabinet {} not found", cabinet_id)))?;

    if cabinet.user_id != user.user_id && !user.is_admin() {
        return Err(ApiError::Forbidden(
            "Cabinet belongs to another account".to_string(),
        ));
    }

    Ok(cabinet)
}
