//! Canned server payloads
//!
//! Builders for the messages a test plays back as the gateway server.

use serde_json::{json, Value};

/// Token used by every test credential.
pub const TEST_TOKEN: &str = "test-token";

/// Hello with the given heartbeat interval in milliseconds.
#[must_use]
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}})
}

/// READY dispatch establishing a session.
#[must_use]
pub fn ready(session_id: &str, seq: u64) -> Value {
    json!({"op": 0, "t": "READY", "s": seq, "d": {"session_id": session_id}})
}

/// RESUMED dispatch acknowledging a resume.
#[must_use]
pub fn resumed(seq: u64) -> Value {
    json!({"op": 0, "t": "RESUMED", "s": seq, "d": {}})
}

/// An arbitrary event dispatch.
#[must_use]
pub fn dispatch(event: &str, seq: u64, data: Value) -> Value {
    json!({"op": 0, "t": event, "s": seq, "d": data})
}

/// Heartbeat acknowledgement.
#[must_use]
pub fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

/// Server-requested reconnect.
#[must_use]
pub fn reconnect() -> Value {
    json!({"op": 5, "d": null})
}

/// Session invalidation; `resumable` mirrors the wire flag.
#[must_use]
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 7, "d": resumable})
}
