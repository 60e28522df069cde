//! Per-domain request pacing.
//!
//! A keyed GCRA limiter with a burst of one and a replenish period equal to
//! the pacing interval: the first request to a domain goes straight through,
//! each following request waits until one interval has passed since the
//! previous one started.

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use hntop_core::Error;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Minimum spacing between two requests to the same domain.
pub struct DomainPacer {
    limiter: Option<KeyedLimiter>,
    interval: Duration,
}

impl DomainPacer {
    /// A zero interval disables pacing.
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| RateLimiter::keyed(quota.allow_burst(NonZeroU32::MIN)));
        Self { limiter, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `domain` may be requested again, or until `cancel` fires.
    pub async fn wait(&self, domain: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        let key = domain.to_string();
        if limiter.check_key(&key).is_ok() {
            return Ok(());
        }

        tracing::debug!(domain, interval_ms = self.interval.as_millis() as u64, "pacing domain");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = limiter.until_key_ready(&key) => Ok(()),
        }
    }

    /// Forget domains whose pacing window has fully elapsed.
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }
}
