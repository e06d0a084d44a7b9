//! Rate limit gate
//!
//! Serializes and throttles concurrent acquisitions against one shared
//! [`RateLimitInfo`] ledger entry.

use super::{RateLimitInfo, SharedRateLimitInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Returned by [`Bucket::try_acquire`] when waiting was opted out of.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rate limited, retry after {retry_after:?}")]
pub struct RateLimitedError {
    /// How long the caller would have had to wait for a grant.
    pub retry_after: Duration,
}

/// A permit to perform one request against the bucket's route class.
///
/// Grants that consumed known budget (and grants made with no limit
/// information) hold nothing, so up to `remaining` requests may be in flight
/// at once. Only a grant that had to wait out a window reset keeps the
/// bucket's serialization lock, so the next waiter is considered once that
/// permit is dropped.
#[derive(Debug)]
pub struct BucketPermit {
    _serial: Option<OwnedMutexGuard<()>>,
}

/// A rate limit gate for one route class.
///
/// The gate never invents permits: `remaining` is only written by [`update`]
/// calls carrying observed server state, plus the single decrement performed
/// when a grant consumes a known permit. A suspended acquire wakes when the
/// last reported reset time passes and grants without touching the ledger.
///
/// [`update`]: Bucket::update
pub struct Bucket {
    /// Ledger entry; swappable so route classes can be merged onto a shared
    /// entry once the server reveals their common bucket.
    info: Mutex<SharedRateLimitInfo>,

    /// FIFO serialization of acquisitions. Waiters are granted in arrival
    /// order; starvation of a waiter is a correctness bug.
    serial: Arc<AsyncMutex<()>>,

    /// Whether this gate ever reserved a permit under a known limit or
    /// observed real usage. Never reverts once set.
    dirty: AtomicBool,
}

impl Bucket {
    /// Create a gate over a fresh, unknown ledger entry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_info(RateLimitInfo::default().shared())
    }

    /// Create a gate referencing an existing shared ledger entry.
    #[must_use]
    pub fn with_info(info: SharedRateLimitInfo) -> Self {
        Self {
            info: Mutex::new(info),
            serial: Arc::new(AsyncMutex::new(())),
            dirty: AtomicBool::new(false),
        }
    }

    /// Handle to the shared ledger entry.
    #[must_use]
    pub fn shared_info(&self) -> SharedRateLimitInfo {
        self.info.lock().clone()
    }

    /// Point this gate at a different shared ledger entry.
    ///
    /// Used when bucket discovery reveals that this route class maps to a
    /// server bucket another gate already tracks. Callers must only migrate
    /// gates that are not [`dirty`](Bucket::dirty), otherwise reserved
    /// permits would be silently forgotten.
    pub fn migrate_info(&self, info: SharedRateLimitInfo) {
        *self.info.lock() = info;
    }

    /// Whether this gate has ever reserved a permit under a known limit.
    #[must_use]
    pub fn dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Mark the route class as exempt from throttling.
    ///
    /// Takes effect on the next acquisition.
    pub fn set_unlimited(&self) {
        self.shared_info().lock().unlimited = true;
    }

    /// Record the window size reported by the server.
    pub fn set_limit(&self, limit: u32) {
        self.shared_info().lock().limit = Some(limit);
    }

    /// Overwrite the ledger with authoritative server state.
    ///
    /// Called after every HTTP exchange with the values parsed from response
    /// headers (or a 429 body). `reset_at` becomes `now + reset_after`.
    pub fn update(&self, remaining: u32, reset_after: Duration) {
        {
            let shared = self.shared_info();
            let mut info = shared.lock();
            info.remaining = Some(remaining);
            info.reset_at = Some(Instant::now() + reset_after);
        }
        self.dirty.store(true, Ordering::Release);
    }

    /// Acquire a permit, suspending until one is available.
    ///
    /// Never fails. Callers are served in arrival order; a throttled caller
    /// suspends until the last reported reset time passes, then is granted
    /// without the ledger being replenished - only a subsequent [`update`]
    /// refreshes `remaining`.
    ///
    /// [`update`]: Bucket::update
    pub async fn acquire(&self) -> BucketPermit {
        let serial = Arc::clone(&self.serial).lock_owned().await;
        let deadline = {
            let shared = self.shared_info();
            let mut info = shared.lock();
            match self.check(&mut info) {
                // Tracked grants release the lock: the decrement already
                // reserved their slot, so they may run concurrently.
                Gate::Free | Gate::Tracked => return BucketPermit { _serial: None },
                Gate::Wait(deadline) => deadline,
            }
        };

        if let Some(at) = deadline {
            let now = Instant::now();
            if at > now {
                tracing::trace!(wait = ?(at - now), "rate limit exhausted, waiting for window reset");
                tokio::time::sleep_until(at).await;
            }
        }

        // Granted after the window reset. The ledger keeps whatever the
        // server last reported; only the caller's next update refreshes it.
        self.dirty.store(true, Ordering::Release);
        BucketPermit {
            _serial: Some(serial),
        }
    }

    /// Acquire a permit without waiting.
    ///
    /// Returns [`RateLimitedError`] carrying the wait duration if a grant
    /// would have required suspending.
    pub fn try_acquire(&self) -> Result<BucketPermit, RateLimitedError> {
        let serial = match Arc::clone(&self.serial).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(RateLimitedError {
                    retry_after: self.time_until_reset(),
                })
            }
        };

        let shared = self.shared_info();
        let mut info = shared.lock();
        match self.check(&mut info) {
            Gate::Free | Gate::Tracked => Ok(BucketPermit { _serial: None }),
            Gate::Wait(deadline) => {
                let now = Instant::now();
                match deadline {
                    Some(at) if at > now => Err(RateLimitedError {
                        retry_after: at - now,
                    }),
                    // Reset already passed: grant without replenishing.
                    _ => {
                        self.dirty.store(true, Ordering::Release);
                        Ok(BucketPermit {
                            _serial: Some(serial),
                        })
                    }
                }
            }
        }
    }

    /// One pass of the grant algorithm. Assumes the serialization lock is
    /// held by the caller.
    fn check(&self, info: &mut RateLimitInfo) -> Gate {
        if info.unlimited {
            return Gate::Free;
        }
        match info.remaining {
            None => {
                if info.limit.is_some() {
                    self.dirty.store(true, Ordering::Release);
                }
                Gate::Free
            }
            Some(n) if n > 0 => {
                info.remaining = Some(n - 1);
                self.dirty.store(true, Ordering::Release);
                Gate::Tracked
            }
            Some(_) => Gate::Wait(info.reset_at),
        }
    }

    fn time_until_reset(&self) -> Duration {
        let shared = self.shared_info();
        let reset_at = shared.lock().reset_at;
        reset_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("info", &*self.shared_info().lock())
            .field("dirty", &self.dirty())
            .finish()
    }
}

enum Gate {
    /// Grant; no limit information constrains this request.
    Free,
    /// Grant; one known permit was consumed from the ledger.
    Tracked,
    /// Suspend until the deadline, then grant. The permit keeps the
    /// serialization lock until released.
    Wait(Option<Instant>),
}
