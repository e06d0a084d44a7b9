//! Payload definitions
//!
//! Structures for the payloads this client sends and the server payloads it
//! needs to understand. Dispatch event bodies are not interpreted; they are
//! forwarded to the consumer as raw JSON.

use super::Intents;
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// First payload the server sends after the transport is established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Starts a fresh session. Subject to the identify concurrency ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Event groups to subscribe to, forwarded verbatim
    pub intents: Intents,

    /// `[shard_index, shard_count]`
    pub shard: [u16; 2],

    /// Optional client properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,

    /// Optional initial presence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceUpdatePayload>,
}

/// Client connection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl IdentifyProperties {
    /// Properties describing this library on the current platform.
    #[must_use]
    pub fn this_library() -> Self {
        Self {
            os: Some(std::env::consts::OS.to_string()),
            browser: Some("concord-rs".to_string()),
            device: Some("concord-rs".to_string()),
        }
    }
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// New status (online, idle, dnd, offline)
    pub status: String,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] = &["online", "idle", "dnd", "offline"];

    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Payload for op 4 (Resume)
///
/// Reattaches to an existing session; bypasses the identify throttle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Body of the READY dispatch, as far as this client cares.
///
/// Everything else in the payload belongs to the consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Session ID for later resumes
    pub session_id: String,
}
