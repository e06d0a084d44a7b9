//! Events delivered to the caller
//!
//! Every event is tagged with the shard it came from. Dispatch payloads are
//! forwarded verbatim; interpreting them is the consumer's job.

use crate::error::GatewayError;
use serde_json::Value;

/// An event from one shard.
#[derive(Debug)]
pub struct ShardEvent {
    /// Which shard produced this event.
    pub shard_id: u16,

    /// What happened.
    pub kind: ShardEventKind,
}

/// The kinds of events a shard reports.
#[derive(Debug)]
pub enum ShardEventKind {
    /// A decoded dispatch payload from the server.
    Dispatch {
        /// Event name (e.g. `MESSAGE_CREATE`).
        event: String,
        /// Sequence number of this dispatch.
        sequence: u64,
        /// Raw event body.
        data: Value,
    },

    /// The transport is up and the server said hello.
    Connected,

    /// A fresh identify completed; a new session exists.
    Identified { session_id: String },

    /// An existing session was resumed.
    Resumed,

    /// The shard stopped. `reason` is `None` for a requested shutdown and
    /// carries the classified error otherwise. Sent at most once per shard
    /// lifetime.
    Disconnected { reason: Option<GatewayError> },
}

impl ShardEvent {
    #[must_use]
    pub fn new(shard_id: u16, kind: ShardEventKind) -> Self {
        Self { shard_id, kind }
    }
}
