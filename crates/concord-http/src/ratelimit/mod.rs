//! Server-dictated rate limiting
//!
//! A [`Bucket`] is the gate callers pass through before a request; a
//! [`RateLimitInfo`] is the shared ledger entry the gate throttles against.
//! Several buckets may reference one ledger entry once the server reveals
//! that their routes share an underlying limit.

mod bucket;
mod info;

pub use bucket::{Bucket, BucketPermit, RateLimitedError};
pub use info::{RateLimitInfo, SharedRateLimitInfo};
