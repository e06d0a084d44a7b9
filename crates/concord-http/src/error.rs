//! HTTP client error types

use crate::ratelimit::RateLimitedError;
use std::time::Duration;

/// Errors from the rate-limited HTTP dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The server rate limited us and either waiting was opted out of or
    /// the retry budget ran out.
    #[error("rate limited (global: {global}), retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        global: bool,
    },

    /// Non-success response from the API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The response carried a malformed rate limit header or body.
    #[error("invalid rate limit metadata: {0}")]
    InvalidRateLimit(String),
}

impl From<RateLimitedError> for HttpError {
    fn from(err: RateLimitedError) -> Self {
        Self::RateLimited {
            retry_after: err.retry_after,
            global: false,
        }
    }
}
