//! Gateway close codes and their client-side classification
//!
//! The mapping from numeric close code to reconnect behavior is a lookup
//! table: new codes the server introduces are additions here, not
//! control-flow changes elsewhere.

use crate::error::GatewayError;

/// Gateway WebSocket close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload encoding (JSON decode error)
    DecodeError = 4002,
    /// Sent payload before Identify
    NotAuthenticated = 4003,
    /// Invalid token provided
    AuthenticationFailed = 4004,
    /// Sent Identify twice
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for Resume
    InvalidSequence = 4007,
    /// Too many requests (rate limited)
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard configuration
    InvalidShard = 4010,
    /// Sharding is required
    ShardingRequired = 4011,
    /// Invalid/outdated API version
    InvalidApiVersion = 4012,
    /// Invalid intents bitmask
    InvalidIntents = 4013,
    /// Intents the credential is not approved for
    DisallowedIntents = 4014,
}

/// What the client should do after a connection closes.
#[derive(Debug)]
pub enum CloseAction {
    /// Reconnect and resume the existing session.
    Resume,
    /// Reconnect with a fresh identify; the session is gone.
    Reidentify,
    /// Stop: the condition will not improve by retrying.
    Fatal(GatewayError),
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// How the client reacts to this close code.
    #[must_use]
    pub fn classify(self) -> CloseAction {
        match self {
            // Transient conditions: the session is still valid server-side.
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::AlreadyAuthenticated
            | Self::RateLimited => CloseAction::Resume,

            // The session is gone but the credential is fine.
            Self::NotAuthenticated | Self::InvalidSequence | Self::SessionTimeout => {
                CloseAction::Reidentify
            }

            // Retrying cannot help.
            Self::AuthenticationFailed => CloseAction::Fatal(GatewayError::InvalidToken),
            Self::InvalidShard => CloseAction::Fatal(GatewayError::InvalidShard),
            Self::ShardingRequired => CloseAction::Fatal(GatewayError::ShardingRequired),
            Self::InvalidApiVersion => CloseAction::Fatal(GatewayError::InvalidApiVersion),
            Self::InvalidIntents => CloseAction::Fatal(GatewayError::InvalidIntents),
            Self::DisallowedIntents => CloseAction::Fatal(GatewayError::DisallowedIntents),
        }
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timeout",
            Self::InvalidShard => "Invalid shard configuration",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

/// Classify an arbitrary close, including codes this client does not know.
///
/// No close code at all (an abrupt transport drop) is resumable. Unknown
/// codes are treated conservatively: retryable, but the session is not
/// trusted to resume.
#[must_use]
pub fn classify_close(code: Option<u16>) -> CloseAction {
    match code {
        None => CloseAction::Resume,
        Some(raw) => match CloseCode::from_u16(raw) {
            Some(code) => code.classify(),
            None => {
                tracing::warn!(code = raw, "unhandled gateway close code");
                CloseAction::Reidentify
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_from_u16() {
        assert_eq!(CloseCode::from_u16(4000), Some(CloseCode::UnknownError));
        assert_eq!(CloseCode::from_u16(4004), Some(CloseCode::AuthenticationFailed));
        assert_eq!(CloseCode::from_u16(4014), Some(CloseCode::DisallowedIntents));
        assert_eq!(CloseCode::from_u16(1000), None);
        assert_eq!(CloseCode::from_u16(4006), None); // 4006 is not defined
    }

    #[test]
    fn test_resumable_codes() {
        assert!(matches!(CloseCode::UnknownError.classify(), CloseAction::Resume));
        assert!(matches!(CloseCode::RateLimited.classify(), CloseAction::Resume));
        assert!(matches!(CloseCode::DecodeError.classify(), CloseAction::Resume));
    }

    #[test]
    fn test_session_invalidating_codes() {
        assert!(matches!(CloseCode::SessionTimeout.classify(), CloseAction::Reidentify));
        assert!(matches!(CloseCode::InvalidSequence.classify(), CloseAction::Reidentify));
    }

    #[test]
    fn test_fatal_codes() {
        assert!(matches!(
            CloseCode::AuthenticationFailed.classify(),
            CloseAction::Fatal(GatewayError::InvalidToken)
        ));
        assert!(matches!(
            CloseCode::DisallowedIntents.classify(),
            CloseAction::Fatal(GatewayError::DisallowedIntents)
        ));
        assert!(matches!(
            CloseCode::InvalidShard.classify(),
            CloseAction::Fatal(GatewayError::InvalidShard)
        ));
        assert!(matches!(
            CloseCode::InvalidApiVersion.classify(),
            CloseAction::Fatal(GatewayError::InvalidApiVersion)
        ));
    }

    #[test]
    fn test_classify_close_edge_cases() {
        // Abrupt drop with no code: resumable.
        assert!(matches!(classify_close(None), CloseAction::Resume));
        // Unknown code: retryable but not resumable.
        assert!(matches!(classify_close(Some(4999)), CloseAction::Reidentify));
        // Normal closure is not in the table either.
        assert!(matches!(classify_close(Some(1000)), CloseAction::Reidentify));
    }
}
