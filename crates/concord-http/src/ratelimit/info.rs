//! Rate limit ledger entry
//!
//! Pure data describing what the server has told us about one route class.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

/// A shared, mutable ledger entry referenced by one or more [`super::Bucket`]s.
pub type SharedRateLimitInfo = Arc<Mutex<RateLimitInfo>>;

/// Known rate limit parameters for a single route class.
///
/// All fields start unknown; they are only ever written from observed server
/// state. `reset_at` is captured as `now + reset_after` at update time and is
/// never extrapolated past what the server last reported.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// Maximum permits per window, if ever observed.
    pub limit: Option<u32>,

    /// Permits left in the current window, if ever observed.
    pub remaining: Option<u32>,

    /// Absolute time the current window resets, derived from the most
    /// recent update.
    pub reset_at: Option<Instant>,

    /// Override: when set, the gate never throttles this route class.
    pub unlimited: bool,
}

impl RateLimitInfo {
    /// An entry with a known limit but no usage observed yet.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Wrap an entry for sharing between buckets.
    #[must_use]
    pub fn shared(self) -> SharedRateLimitInfo {
        Arc::new(Mutex::new(self))
    }
}
