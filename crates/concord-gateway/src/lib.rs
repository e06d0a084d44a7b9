//! # concord-gateway
//!
//! Sharded websocket gateway client for Concord real-time events.
//!
//! The [`shard::ShardManager`] owns one [`shard`] per gateway connection,
//! enforces the server's identify concurrency ceiling across them, and hands
//! every decoded payload to the caller's event channel tagged with shard
//! identity. Individual shards drive the identify/resume/heartbeat protocol
//! and reconnect on their own according to server-classified close codes.

pub mod decompressor;
pub mod error;
pub mod events;
pub mod protocol;
pub mod shard;
pub mod transport;

pub use decompressor::{DecompressError, Decompressor};
pub use error::GatewayError;
pub use events::{ShardEvent, ShardEventKind};
pub use shard::{IdentifyThrottle, ShardHandle, ShardManager, ShardManagerConfig, ShardState};
pub use transport::{GatewayConnector, Transport, TransportError, TransportEvent, WsConnector};
