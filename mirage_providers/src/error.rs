use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request to {endpoint} timed out after {}s", .timeout.as_secs())]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format: missing content at {path}")]
    MissingContent { path: &'static str },

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Connection failures, rate limits and server errors. Timeouts are final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
