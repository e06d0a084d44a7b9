//! Credential handling
//!
//! Holds the bot token used for both the HTTP surface and the gateway identify.

use std::fmt;

/// A bot token.
///
/// The raw value is kept private and redacted from `Debug` output so it cannot
/// leak through logs or error chains.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token value, for embedding in identify/resume payloads.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The value of the `Authorization` header for HTTP requests.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bot {}", self.0)
    }

    /// A stable key for per-credential rate limit bucketing.
    #[must_use]
    pub fn rate_limit_key(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&"<redacted>").finish()
    }
}

impl From<String> for Token {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
