//! Rolling-window token bucket
//!
//! Capacity N, refilled N per rolling window: a request may be dispatched
//! only while fewer than N dispatches happened in the preceding window.
//! Every interval of one window length therefore contains at most N
//! dispatches, no matter how many tasks share the limiter.
//!
//! Callers that find the bucket empty suspend until the oldest dispatch
//! leaves the window, up to `max_wait`; past that they fail with
//! `ResolveError::RateLimitTimeout`. The dispatch log sits behind a single
//! async mutex which waiters acquire in FIFO order.

use crate::error::ResolveError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Rolling-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    max_wait: Duration,
    dispatched: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: u32, window: Duration, max_wait: Duration) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            capacity,
            window,
            max_wait,
            dispatched: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Take one token, waiting for refill if necessary
    ///
    /// **Algorithm:**
    /// 1. Lock the dispatch log (time spent queued counts toward `max_wait`)
    /// 2. Drop dispatches older than one window
    /// 3. If fewer than `capacity` remain, record `now` and return
    /// 4. Otherwise, if waiting for the oldest entry to expire would exceed
    ///    `max_wait`, fail; else sleep until it expires and repeat from 2
    pub async fn acquire(&self) -> Result<(), ResolveError> {
        let start = Instant::now();

        let mut log = match tokio::time::timeout(self.max_wait, self.dispatched.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(
                    waited_ms = start.elapsed().as_millis() as u64,
                    "Rate limiter queue wait exceeded maximum"
                );
                return Err(ResolveError::RateLimitTimeout {
                    waited: start.elapsed(),
                });
            }
        };

        loop {
            let now = Instant::now();
            while log
                .front()
                .map_or(false, |&oldest| now.duration_since(oldest) >= self.window)
            {
                log.pop_front();
            }

            let oldest = match log.front() {
                Some(&oldest) if log.len() >= self.capacity => oldest,
                _ => {
                    log.push_back(now);
                    return Ok(());
                }
            };

            let ready_at = oldest + self.window;
            let waited = now.duration_since(start);
            let needed = ready_at.duration_since(now);

            if waited + needed > self.max_wait {
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    needed_ms = needed.as_millis() as u64,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "Rate limit token not available within maximum wait"
                );
                return Err(ResolveError::RateLimitTimeout { waited });
            }

            tracing::debug!(
                wait_ms = needed.as_millis() as u64,
                capacity = self.capacity,
                "Rate limiting: waiting for token"
            );
            sleep_until(ready_at).await;
        }
    }

    /// Tokens available right now
    #[cfg(test)]
    pub(crate) async fn available(&self) -> usize {
        let log = self.dispatched.lock().await;
        let now = Instant::now();
        let live = log
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count();
        self.capacity.saturating_sub(live)
    }
}
