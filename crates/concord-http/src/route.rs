//! Route descriptors
//!
//! A route identifies one API call and the rate limit class it belongs to.
//! Routes sharing a bucket key share a gate; the server may later reveal
//! that several keys map to one underlying bucket.

use reqwest::Method;
use std::fmt;

/// An API route and its rate limit identity.
#[derive(Debug, Clone)]
pub struct Route {
    /// HTTP method.
    pub method: Method,

    /// Request path relative to the API base URL.
    pub path: String,

    /// Route class key. Paths that differ only in minor parameters share a
    /// key; major parameters (guild/channel ids) are baked in.
    pub bucket_key: String,

    /// Skip the global gate for this route (used by unauthenticated
    /// endpoints the server exempts from the global limit).
    pub ignore_global: bool,
}

impl Route {
    /// Create a route whose bucket key is derived from method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let bucket_key = format!("{method} {path}");
        Self {
            method,
            path,
            bucket_key,
            ignore_global: false,
        }
    }

    /// Shorthand for a GET route.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST route.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Scope the bucket key to a major parameter such as a guild or
    /// channel id.
    #[must_use]
    pub fn with_major(mut self, major: impl fmt::Display) -> Self {
        self.bucket_key = format!("{} major={major}", self.bucket_key);
        self
    }

    /// Exempt this route from the global gate.
    #[must_use]
    pub fn ignore_global(mut self) -> Self {
        self.ignore_global = true;
        self
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
