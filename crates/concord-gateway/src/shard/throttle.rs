//! Identify concurrency throttle
//!
//! One per concurrency bucket. The server allows one fresh identify per
//! bucket per fixed window; shards in the same bucket queue here in arrival
//! order, exactly like a rate limit gate with a known, fixed limit.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Server-documented identify window per concurrency bucket.
pub const IDENTIFY_WINDOW: Duration = Duration::from_secs(5);

/// Fixed-window gate for identify payloads.
pub struct IdentifyThrottle {
    window: Duration,
    /// FIFO serialization; waiters are granted in arrival order.
    serial: tokio::sync::Mutex<()>,
    /// When the next identify may go out.
    next_ready: Mutex<Option<Instant>>,
}

impl IdentifyThrottle {
    /// Throttle with the server-documented window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(IDENTIFY_WINDOW)
    }

    /// Throttle with a custom window (testing and future server overrides).
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            serial: tokio::sync::Mutex::new(()),
            next_ready: Mutex::new(None),
        }
    }

    /// Wait for this bucket's next identify slot.
    ///
    /// Consumes the slot on return; the caller should transmit its identify
    /// promptly. Dropping the future while queued gives the slot up without
    /// consuming anything.
    pub async fn acquire(&self) {
        let _serial = self.serial.lock().await;

        let deadline = *self.next_ready.lock();
        if let Some(at) = deadline {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }

        *self.next_ready.lock() = Some(Instant::now() + self.window);
    }

    /// Consume a slot only if one is free right now.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let Ok(_serial) = self.serial.try_lock() else {
            return Err(self.window);
        };

        let deadline = *self.next_ready.lock();
        if let Some(at) = deadline {
            let now = Instant::now();
            if at > now {
                return Err(at - now);
            }
        }

        *self.next_ready.lock() = Some(Instant::now() + self.window);
        Ok(())
    }
}

impl Default for IdentifyThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdentifyThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifyThrottle")
            .field("window", &self.window)
            .finish()
    }
}
