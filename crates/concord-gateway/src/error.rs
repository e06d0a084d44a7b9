//! Gateway error taxonomy
//!
//! Transient conditions (throttle waits, resumable disconnects) are handled
//! internally and never appear here. These are the conditions that end a
//! shard, surfaced exactly once through its event channel.

use crate::decompressor::DecompressError;
use crate::transport::TransportError;
use concord_http::HttpError;

/// Errors surfaced by a gateway connection or the shard manager.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The token was rejected during identify.
    #[error("authentication failed: invalid token")]
    InvalidToken,

    /// The intents bitmask was malformed.
    #[error("invalid gateway intents")]
    InvalidIntents,

    /// The intents include groups this credential is not approved for.
    #[error("disallowed gateway intents")]
    DisallowedIntents,

    /// The server rejected the API version.
    #[error("invalid API version")]
    InvalidApiVersion,

    /// The shard index/count pair was rejected.
    #[error("invalid shard configuration")]
    InvalidShard,

    /// The bot has too many guilds for an unsharded connection.
    #[error("sharding required")]
    ShardingRequired,

    /// The reconnect policy refused another attempt.
    #[error("reconnect check failed after {attempts} attempts")]
    ReconnectCheckFailed { attempts: u32 },

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The compressed stream could not be decoded.
    #[error(transparent)]
    Decompress(#[from] DecompressError),

    /// A payload violated the protocol in a way we cannot work around.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A payload failed to decode as JSON.
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An HTTP exchange needed by the gateway (topology discovery) failed.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl GatewayError {
    /// Whether this condition can improve by reconnecting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidToken
                | Self::InvalidIntents
                | Self::DisallowedIntents
                | Self::InvalidApiVersion
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::ReconnectCheckFailed { .. }
        )
    }
}
