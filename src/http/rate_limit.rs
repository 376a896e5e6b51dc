//! Throttling helpers
//!
//! [`PageDelay`] is the fixed pause between successive pages of one run.
//! [`RateLimiter`] is an optional token bucket (governor) in front of every
//! request the fetcher sends.

use super::retry::{Sleeper, TokioSleeper};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Fixed delay between page fetches
#[derive(Clone)]
pub struct PageDelay {
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for PageDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl PageDelay {
    /// Create a delay sleeping on the tokio timer
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// No delay at all
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Replace the sleeper
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Configured delay
    pub fn duration(&self) -> Duration {
        self.delay
    }

    /// Block the current run for the configured delay
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            self.sleeper.sleep(self.delay).await;
        }
    }
}

impl std::fmt::Debug for PageDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageDelay")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Configuration for the request quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per second
    pub requests_per_second: u32,
    /// Burst size (max tokens in bucket)
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }
}

/// Token bucket rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}
