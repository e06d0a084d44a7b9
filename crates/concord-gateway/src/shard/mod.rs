//! Shards and their manager
//!
//! A shard owns one gateway connection and its lifecycle state machine; the
//! manager owns the set of shards and the identify concurrency ceiling
//! across them.

mod manager;
mod reconnect;
mod session;
mod shard;
mod throttle;

pub use manager::{ShardManager, ShardManagerConfig};
pub use reconnect::ReconnectPolicy;
pub use session::Session;
pub use shard::{ShardHandle, ShardState};
pub use throttle::IdentifyThrottle;
