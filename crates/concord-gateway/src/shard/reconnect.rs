//! Reconnect eligibility and backoff
//!
//! Runs before every reconnect attempt. A rejected attempt ends the shard
//! instead of letting it loop forever against a broken gateway.

use crate::error::GatewayError;
use concord_common::ReconnectConfig;
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff with full jitter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Attempts made since the last healthy connection.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check eligibility for one more attempt.
    ///
    /// Returns the delay to wait before reconnecting, or
    /// [`GatewayError::ReconnectCheckFailed`] when the budget is spent.
    pub fn check(&mut self) -> Result<Duration, GatewayError> {
        if self.attempts >= self.config.max_attempts {
            return Err(GatewayError::ReconnectCheckFailed {
                attempts: self.attempts,
            });
        }

        let exp = self
            .config
            .base_delay()
            .saturating_mul(1u32 << self.attempts.min(16))
            .min(self.config.max_delay());
        self.attempts += 1;

        // Full jitter: anywhere in [0, exp].
        let millis = exp.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(0..=millis);
        Ok(Duration::from_millis(jittered))
    }

    /// A connection became healthy; the budget starts over.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
