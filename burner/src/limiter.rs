//! Token bucket limiting how fast a job issues create calls.
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Token bucket shared by every create task of a job.
///
/// Callers reserve a token up front and then sleep until the bucket has
/// refilled enough to cover it, so the lock is never held across an await and
/// concurrent callers are served in reservation order.
pub struct RateLimiter {
    bucket: Option<Mutex<Bucket>>,
}

struct Bucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    // Take one token and report how long the caller must wait before using it.
    fn reserve(&mut self, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}

impl RateLimiter {
    /// Limit to `qps` calls per second with bursts of up to `burst` calls.
    ///
    /// A `qps` of zero disables throttling. A `burst` of zero uses `qps`.
    pub fn new(qps: u32, burst: u32) -> Self {
        if qps == 0 {
            return Self::unlimited();
        }
        let capacity = f64::from(if burst == 0 { qps } else { burst });
        Self {
            bucket: Some(Mutex::new(Bucket {
                rate: f64::from(qps),
                capacity,
                tokens: capacity,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Limiter that never waits.
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Wait for a token.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first, in which case
    /// the reserved token goes back into the bucket.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let wait = bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reserve(Instant::now());
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                bucket.lock().unwrap_or_else(PoisonError::into_inner).tokens += 1.0;
                Err(Error::Cancelled)
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
