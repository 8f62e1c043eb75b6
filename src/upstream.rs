//! Errors shared by every outbound HTTP collaborator

use thiserror::Error;

/// Failure talking to an external API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Non-2xx response, body kept verbatim
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Upstream response could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Provider rejected the credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, UpstreamError::Status { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

/// Turn a non-2xx response into `UpstreamError::Status`
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_statuses() {
        let status = |status| UpstreamError::Status {
            status,
            body: String::new(),
        };
        assert!(status(401).is_unauthorized());
        assert!(status(403).is_unauthorized());
        assert!(!status(429).is_unauthorized());
        assert!(!UpstreamError::Timeout.is_unauthorized());
    }
}
