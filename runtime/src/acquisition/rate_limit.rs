//! Minimum-interval request pacing.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::time::Duration;

/// Lets one request through per `interval`.
///
/// Process-local. Clones of an `HttpClient` share one limiter through an
/// `Arc`, so concurrent workers behind the same client serialize on it.
pub struct IntervalLimiter {
    inner: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    interval: Duration,
}

impl IntervalLimiter {
    /// A zero interval disables pacing.
    pub fn new(interval: Duration) -> Self {
        let inner = Quota::with_period(interval).map(RateLimiter::direct);
        Self { inner, interval }
    }

    /// Wait until the next request may be issued.
    pub async fn wait(&self) {
        if let Some(limiter) = &self.inner {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for IntervalLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalLimiter")
            .field("interval", &self.interval)
            .finish()
    }
}
