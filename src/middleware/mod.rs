//! Middleware for ReviewDesk API
//!
//! Request tracing and bearer-token authentication extractors.

pub mod auth;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, OptionalUser};
pub use self::tracing::request_tracing;
