//! Rate-limited HTTP dispatch
//!
//! Maps each request to its route gate (plus the global gate), performs the
//! exchange, and feeds the server-reported limit state back into the ledger.

use crate::error::HttpError;
use crate::ratelimit::{Bucket, BucketPermit, RateLimitedError, SharedRateLimitInfo};
use crate::route::Route;
use concord_common::{ApiConfig, Token};
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Rate limit state parsed from response headers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_after: Duration,
    pub bucket_hash: Option<String>,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// The rate-limited HTTP client.
///
/// Owns one gate per route class, a registry of server-discovered buckets,
/// and the process-wide global gate. All requests flow through
/// [`request`](HttpClient::request), which acquires the global gate, then the
/// route gate, sends, and replays the response's limit state into the ledger.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<Token>,
    global: Bucket,
    routes: DashMap<String, Arc<Bucket>>,
    discovered: DashMap<String, SharedRateLimitInfo>,
    max_retries: u32,
}

impl HttpClient {
    /// Build a client from configuration.
    pub fn new(config: &ApiConfig, token: Option<Token>) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            global: Bucket::new(),
            routes: DashMap::new(),
            discovered: DashMap::new(),
            max_retries: config.max_retries,
        })
    }

    /// Acquire the global gate.
    pub async fn acquire_global(&self) -> BucketPermit {
        self.global.acquire().await
    }

    /// Acquire the gate for a route class.
    pub async fn acquire_route(&self, route_key: &str) -> BucketPermit {
        self.route_bucket(route_key).acquire().await
    }

    /// Feed observed server state into a route gate.
    pub fn update(&self, route_key: &str, remaining: u32, reset_after: Duration) {
        self.route_bucket(route_key).update(remaining, reset_after);
    }

    /// Feed observed server state into the global gate.
    pub fn update_global(&self, remaining: u32, reset_after: Duration) {
        self.global.update(remaining, reset_after);
    }

    /// Perform a request through the rate limit gates.
    ///
    /// `customize` is applied to the request builder on every attempt (the
    /// request may be retried after a 429). The permits are held until the
    /// response's rate limit state has been written back, so the next waiter
    /// on the same gate always sees the freshest ledger.
    pub async fn request<F>(&self, route: &Route, customize: F) -> Result<Response, HttpError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let _global = if route.ignore_global {
                None
            } else {
                Some(self.global.acquire().await)
            };
            let bucket = self.route_bucket(&route.bucket_key);
            let _permit = bucket.acquire().await;

            let url = format!("{}{}", self.base_url, route.path);
            let mut builder = self.http.request(route.method.clone(), &url);
            if let Some(token) = &self.token {
                builder = builder.header(reqwest::header::AUTHORIZATION, token.authorization());
            }
            let response = customize(builder).send().await?;

            self.note_rate_limit(&bucket, route, response.headers());

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let retry = self.note_rate_limited(&bucket, route, response).await?;
                attempt += 1;
                if attempt > self.max_retries {
                    return Err(retry);
                }
                tracing::debug!(route = %route, attempt, "retrying after 429");
                continue;
            }

            if response.status().is_client_error() || response.status().is_server_error() {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                return Err(HttpError::Api { status, message });
            }

            return Ok(response);
        }
    }

    /// Non-waiting variant of the gate acquisition, for callers that opt out
    /// of suspension. Surfaces the wait duration instead of blocking.
    pub fn try_acquire_route(&self, route: &Route) -> Result<BucketPermit, RateLimitedError> {
        self.route_bucket(&route.bucket_key).try_acquire()
    }

    fn route_bucket(&self, route_key: &str) -> Arc<Bucket> {
        self.routes
            .entry(route_key.to_string())
            .or_insert_with(|| Arc::new(Bucket::new()))
            .clone()
    }

    /// Replay successful-response headers into the ledger, merging the route
    /// onto a shared server bucket on first discovery.
    fn note_rate_limit(&self, bucket: &Bucket, route: &Route, headers: &HeaderMap) {
        let Some(parsed) = parse_rate_limit_headers(headers) else {
            return;
        };

        if let Some(hash) = &parsed.bucket_hash {
            // A clean gate can be rebound to an already-known server bucket;
            // a dirty one has reserved permits the shared entry knows nothing
            // about, so it keeps its own ledger.
            if !bucket.dirty() {
                match self.discovered.get(hash) {
                    Some(shared) => {
                        tracing::debug!(route = %route, bucket = %hash, "merging route onto discovered bucket");
                        bucket.migrate_info(shared.clone());
                    }
                    None => {
                        self.discovered.insert(hash.clone(), bucket.shared_info());
                    }
                }
            }
        }

        if let Some(limit) = parsed.limit {
            bucket.set_limit(limit);
        }
        bucket.update(parsed.remaining, parsed.reset_after);
    }

    /// Handle a 429: distinguish global from route scope and update the
    /// corresponding gate from the body's `retry_after`.
    async fn note_rate_limited(
        &self,
        bucket: &Bucket,
        route: &Route,
        response: Response,
    ) -> Result<HttpError, HttpError> {
        let body: RateLimitedBody = response
            .json()
            .await
            .map_err(|e| HttpError::InvalidRateLimit(e.to_string()))?;
        let retry_after = Duration::from_secs_f64(body.retry_after.max(0.0));

        if body.global {
            tracing::warn!(route = %route, ?retry_after, "hit the global rate limit");
            self.global.update(0, retry_after);
        } else {
            tracing::debug!(route = %route, ?retry_after, "hit a route rate limit");
            bucket.update(0, retry_after);
        }

        Ok(HttpError::RateLimited {
            retry_after,
            global: body.global,
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Parse the `X-RateLimit-*` family out of a response.
///
/// Returns `None` when the response carries no usable rate limit state
/// (remaining and reset-after are both required).
pub(crate) fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitHeaders> {
    let remaining = header_value(headers, "x-ratelimit-remaining")?.parse().ok()?;
    let reset_after: f64 = header_value(headers, "x-ratelimit-reset-after")?.parse().ok()?;
    if !reset_after.is_finite() || reset_after < 0.0 {
        return None;
    }

    let limit = header_value(headers, "x-ratelimit-limit").and_then(|v| v.parse().ok());
    let bucket_hash = header_value(headers, "x-ratelimit-bucket").map(str::to_string);

    Some(RateLimitHeaders {
        limit,
        remaining,
        reset_after: Duration::from_secs_f64(reset_after),
        bucket_hash,
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
