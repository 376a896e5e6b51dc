//! HTTP module
//!
//! Provides the single-attempt fetcher, the retry policy that wraps it,
//! and the throttling helpers.
//!
//! # Features
//!
//! - **Classified failures**: transport, timeout, HTTP status, malformed body
//! - **Retry Policy**: bounded exponential backoff, network/HTTP errors only
//! - **Page delay**: fixed pause between successive pages
//! - **Request quota**: optional token bucket using governor

mod client;
mod rate_limit;
mod retry;

pub use client::{FetcherConfig, FetcherConfigBuilder, HttpFetcher, PageRequest, PageSource};
pub use rate_limit::{PageDelay, RateLimiter, RateLimiterConfig};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

#[cfg(test)]
pub(crate) use retry::RecordingSleeper;
