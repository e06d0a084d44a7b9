//! Integration test utilities for the Concord client
//!
//! Provides a channel-backed gateway transport so tests can play the
//! server's side of the connection protocol without a real websocket.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
