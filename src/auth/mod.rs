//! Authentication for ReviewDesk
//!
//! Bearer JWT verification. Token issuance and session handling belong to
//! the account service in front of this API.

mod jwt;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};

/// Verifies bearer tokens against the shared secret
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        verify_token(token, &self.secret)
    }
}
