//! Single-attempt HTTP fetcher
//!
//! Issues exactly one authenticated GET per call and classifies the outcome:
//! - transport failures and timeouts
//! - non-2xx status codes (status preserved)
//! - bodies that are not JSON
//!
//! Retrying is the caller's business (see [`super::RetryPolicy`]).

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::Credentials;
use crate::decode::parse_body;
use crate::error::{Error, Result};
use crate::types::{JsonValue, QueryParams};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Longest error body kept in an [`Error::HttpStatus`]
const MAX_ERROR_BODY: usize = 512;

/// One GET request for one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Fully resolved URL
    pub url: String,
    /// Query parameters, pagination fields included
    pub query: QueryParams,
    /// Extra request headers
    pub headers: HashMap<String, String>,
}

impl PageRequest {
    /// Create a request for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Value of a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// Anything that can turn a [`PageRequest`] into a parsed response body
///
/// The pagination controller only sees this trait, so it can be driven by
/// scripted responses in tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Perform one attempt
    async fn fetch(&self, request: &PageRequest) -> Result<JsonValue>;
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Identifying user agent
    pub user_agent: String,
    /// Optional request quota
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent on every request
    pub default_headers: HashMap<String, String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("jira-pipeline/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: None,
            default_headers: HashMap::new(),
        }
    }
}

impl FetcherConfig {
    /// Create a new config builder
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::default()
    }
}

/// Builder for fetcher config
#[derive(Default)]
pub struct FetcherConfigBuilder {
    config: FetcherConfig,
}

impl FetcherConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Cap requests per second
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Build the config
    pub fn build(self) -> FetcherConfig {
        self.config
    }
}

/// Authenticated single-attempt GET client
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
    credentials: Credentials,
    rate_limiter: Option<RateLimiter>,
}

impl HttpFetcher {
    /// Create a fetcher
    pub fn new(config: FetcherConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            credentials,
            rate_limiter,
        })
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            #[allow(clippy::cast_possible_truncation)]
            return Error::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            };
        }
        if e.is_builder() {
            return Error::config(format!("Invalid request: {e}"));
        }
        Error::Transport(e)
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<JsonValue> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self
            .client
            .get(&request.url)
            .header(ACCEPT, "application/json");

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        req = self.credentials.apply(req).timeout(self.config.timeout);

        let response = req.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(Error::http_status(status.as_u16(), body));
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        debug!(url = %request.url, bytes = text.len(), "GET succeeded");
        parse_body(&text)
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}
