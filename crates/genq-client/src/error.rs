//! Client error taxonomy

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("missing configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP 429 from the workspace. `retry_after` carries the server's
    /// `Retry-After` hint when one was sent.
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("no Genie spaces accessible in this workspace")]
    NoSpaces,

    #[error("conversation contains no user message")]
    MissingUserMessage,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("message did not complete within {0:?}")]
    PollTimeout(Duration),

    #[error("message processing failed: {0}")]
    MessageFailed(String),
}

impl ClientError {
    /// Whether this error is a transient slow-down signal rather than a
    /// genuine failure.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ClientError::RateLimited { .. })
    }
}
