//! # concord-http
//!
//! Rate-limited HTTP dispatch for the Concord API.
//!
//! The server is the only source of truth for rate limits: every response
//! carries the authoritative `remaining`/`reset-after` values for its route
//! class, and this crate replays that policy faithfully instead of inventing
//! a replenishment model of its own.

pub mod client;
pub mod error;
pub mod ratelimit;
pub mod route;
pub mod wrappers;

pub use client::HttpClient;
pub use error::HttpError;
pub use ratelimit::{Bucket, BucketPermit, RateLimitInfo, RateLimitedError, SharedRateLimitInfo};
pub use route::Route;
pub use wrappers::{GatewayBotInfo, GatewayInfo, SessionStartLimit};
