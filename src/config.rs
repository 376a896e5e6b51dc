//! Pipeline configuration
//!
//! Loaded from a YAML file, then overridden from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `JIRA_SUBDOMAIN` | `jira.subdomain` |
//! | `JIRA_EMAIL` | `jira.email` |
//! | `JIRA_API_TOKEN` | `jira.api_token` |
//! | `JIRA_BASE_URL` | `jira.base_url` |
//! | `JIRA_PAGE_SIZE` | `jira.page_size` |

use crate::auth::Credentials;
use crate::error::{Error, Result};
use crate::http::{FetcherConfig, PageDelay, RateLimiterConfig, RetryPolicy};
use crate::pipeline::{PipelineSettings, DEFAULT_ISSUE_QUERY};
use crate::sink::{DuckDbSink, DEFAULT_SCHEMA};
use crate::transform::TransformConfig;
use crate::types::FailurePolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Atlassian site subdomain
static SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap()
});

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Jira site and credentials
    #[serde(default)]
    pub jira: JiraConfig,

    /// Retry, throttling and quota
    #[serde(default)]
    pub http: HttpConfig,

    /// Issue extraction
    #[serde(default)]
    pub issues: IssuesConfig,

    /// Per-entity failure policy overrides (issues is hard by default)
    #[serde(default)]
    pub failure_policy: BTreeMap<String, FailurePolicy>,

    /// DuckDB warehouse
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// dbt transforms
    #[serde(default)]
    pub transform: TransformConfig,
}

// ============================================================================
// Sections
// ============================================================================

/// Jira site and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraConfig {
    /// `acme` for `https://acme.atlassian.net`
    #[serde(default)]
    pub subdomain: Option<String>,

    /// Account email
    #[serde(default)]
    pub email: Option<String>,

    /// API token
    #[serde(default)]
    pub api_token: Option<String>,

    /// Full site URL, overrides the subdomain
    #[serde(default)]
    pub base_url: Option<String>,

    /// Records per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            subdomain: None,
            email: None,
            api_token: None,
            base_url: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_page_size() -> u32 {
    50
}

fn default_timeout() -> u64 {
    30
}

/// Retry and throttling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Attempts per page, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after the first failure, doubled each retry
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    /// Pause between pages
    #[serde(default = "default_page_delay")]
    pub page_delay_secs: f64,

    /// Optional request quota
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// Burst allowed by the quota
    #[serde(default)]
    pub burst_size: Option<u32>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            page_delay_secs: default_page_delay(),
            requests_per_second: None,
            burst_size: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_page_delay() -> f64 {
    0.1
}

/// Issue extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuesConfig {
    /// JQL queries, run in order
    #[serde(default = "default_jql_queries")]
    pub jql_queries: Vec<String>,

    /// Use the token-paginated search endpoint
    #[serde(default = "default_true")]
    pub use_search_endpoint: bool,

    /// Safety limit on issues per run (0 = unlimited); users, projects
    /// and workflows always load in full
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            jql_queries: default_jql_queries(),
            use_search_endpoint: default_true(),
            max_records: default_max_records(),
        }
    }
}

fn default_jql_queries() -> Vec<String> {
    vec![DEFAULT_ISSUE_QUERY.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_max_records() -> usize {
    10_000
}

/// DuckDB warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Database file
    #[serde(default = "default_warehouse_path")]
    pub path: PathBuf,

    /// Schema holding the entity tables
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
            schema: default_schema(),
        }
    }
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("jira.duckdb")
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

// ============================================================================
// Loading
// ============================================================================

impl PipelineConfig {
    /// Load a config file, apply environment overrides, validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file and apply environment overrides
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Parse YAML without overrides or validation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `JIRA_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `JIRA_*` overrides from any lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JIRA_SUBDOMAIN") {
            self.jira.subdomain = Some(v);
        }
        if let Some(v) = get("JIRA_EMAIL") {
            self.jira.email = Some(v);
        }
        if let Some(v) = get("JIRA_API_TOKEN") {
            self.jira.api_token = Some(v);
        }
        if let Some(v) = get("JIRA_BASE_URL") {
            self.jira.base_url = Some(v);
        }
        if let Some(v) = get("JIRA_PAGE_SIZE") {
            self.jira.page_size = v
                .trim()
                .parse()
                .map_err(|e| Error::invalid_value("JIRA_PAGE_SIZE", format!("{v}: {e}")))?;
        }
        Ok(())
    }

    /// Check required fields and ranges
    pub fn validate(&self) -> Result<()> {
        if self.jira.base_url.is_none() {
            let subdomain = self
                .jira
                .subdomain
                .as_deref()
                .ok_or_else(|| Error::missing_field("jira.subdomain"))?;
            if !SUBDOMAIN.is_match(subdomain) {
                return Err(Error::invalid_value(
                    "jira.subdomain",
                    format!("'{subdomain}' is not a valid Atlassian subdomain"),
                ));
            }
        }
        self.base_url()?;

        if is_blank(self.jira.email.as_deref()) {
            return Err(Error::missing_field("jira.email"));
        }
        if is_blank(self.jira.api_token.as_deref()) {
            return Err(Error::missing_field("jira.api_token"));
        }
        if self.jira.page_size == 0 {
            return Err(Error::invalid_value("jira.page_size", "must be greater than 0"));
        }
        if self.http.max_attempts == 0 {
            return Err(Error::invalid_value("http.max_attempts", "must be at least 1"));
        }
        for (field, secs) in [
            ("http.retry_delay_secs", self.http.retry_delay_secs),
            ("http.page_delay_secs", self.http.page_delay_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::invalid_value(field, "must be a non-negative number"));
            }
        }
        if self.http.requests_per_second == Some(0) {
            return Err(Error::invalid_value(
                "http.requests_per_second",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Derived Settings
    // ========================================================================

    /// Site root URL
    pub fn base_url(&self) -> Result<String> {
        let url = match (&self.jira.base_url, &self.jira.subdomain) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(subdomain)) => format!("https://{subdomain}.atlassian.net"),
            (None, None) => return Err(Error::missing_field("jira.subdomain")),
        };
        url::Url::parse(&url)?;
        Ok(url)
    }

    /// Basic-auth credentials
    pub fn credentials(&self) -> Result<Credentials> {
        let email = self
            .jira
            .email
            .clone()
            .ok_or_else(|| Error::missing_field("jira.email"))?;
        let token = self
            .jira
            .api_token
            .clone()
            .ok_or_else(|| Error::missing_field("jira.api_token"))?;
        Ok(Credentials::new(email, token))
    }

    /// HTTP fetcher settings
    pub fn fetcher_config(&self) -> FetcherConfig {
        let mut builder = FetcherConfig::builder().timeout(Duration::from_secs(self.jira.timeout_secs));
        if let Some(rps) = self.http.requests_per_second {
            builder = builder.rate_limit(RateLimiterConfig::new(
                rps,
                self.http.burst_size.unwrap_or(rps),
            ));
        }
        builder.build()
    }

    /// Retry policy for page fetches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http.max_attempts,
            Duration::try_from_secs_f64(self.http.retry_delay_secs).unwrap_or_default(),
        )
    }

    /// Pause between pages
    pub fn page_delay(&self) -> PageDelay {
        PageDelay::new(Duration::try_from_secs_f64(self.http.page_delay_secs).unwrap_or_default())
    }

    /// Pipeline settings
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let mut settings = PipelineSettings::new(self.base_url()?)
            .with_page_size(self.jira.page_size)
            .with_max_issues(self.issues.max_records)
            .with_issue_queries(self.issues.jql_queries.clone())
            .with_search_endpoint(self.issues.use_search_endpoint);
        settings
            .failure_policies
            .extend(self.failure_policy.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(settings)
    }

    /// Open the configured warehouse
    pub fn open_sink(&self) -> Result<DuckDbSink> {
        DuckDbSink::open(&self.warehouse.path, &self.warehouse.schema)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const MINIMAL: &str = r#"
jira:
  subdomain: acme
  email: me@acme.io
  api_token: secret
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.base_url().unwrap(), "https://acme.atlassian.net");
        assert_eq!(config.jira.page_size, 50);
        assert_eq!(config.jira.timeout_secs, 30);
        assert_eq!(config.http.max_attempts, 3);
        assert_eq!(config.http.retry_delay_secs, 1.0);
        assert_eq!(config.http.page_delay_secs, 0.1);
        assert_eq!(config.issues.jql_queries, vec![r#"updated >= "-5d""#.to_string()]);
        assert!(config.issues.use_search_endpoint);
        assert_eq!(config.warehouse.schema, "jira_data");
        assert_eq!(config.transform.program, "dbt");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
jira:
  base_url: "https://jira.internal.example.com/"
  email: me@acme.io
  api_token: secret
  page_size: 100
http:
  max_attempts: 5
  retry_delay_secs: 0.5
  page_delay_secs: 0
  requests_per_second: 8
issues:
  jql_queries:
    - "project = PRJ"
    - "project = OPS"
  use_search_endpoint: false
  max_records: 0
failure_policy:
  users: hard
warehouse:
  path: /tmp/warehouse/jira.duckdb
  schema: raw_jira
transform:
  project_dir: analytics
  threads: 4
  generate_docs: false
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.base_url().unwrap(), "https://jira.internal.example.com");
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(500));
        assert_eq!(config.page_delay().duration(), Duration::ZERO);
        assert_eq!(
            config.fetcher_config().rate_limit,
            Some(RateLimiterConfig::new(8, 8))
        );
        assert_eq!(config.transform.threads, 4);
        assert!(!config.transform.generate_docs);

        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.max_issues, 0);
        assert!(!settings.use_search_endpoint);
        assert_eq!(settings.issue_queries.len(), 2);
        assert_eq!(settings.policy("users"), FailurePolicy::Hard);
        assert_eq!(settings.policy("issues"), FailurePolicy::Hard);
        assert_eq!(settings.policy("projects"), FailurePolicy::Soft);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("JIRA_SUBDOMAIN", "other"),
            ("JIRA_API_TOKEN", "from-env"),
            ("JIRA_PAGE_SIZE", "25"),
            ("JIRA_EMAIL", "  "),
        ]);

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config
            .apply_env_from(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.jira.subdomain.as_deref(), Some("other"));
        assert_eq!(config.jira.api_token.as_deref(), Some("from-env"));
        assert_eq!(config.jira.page_size, 25);
        // Blank values do not override
        assert_eq!(config.jira.email.as_deref(), Some("me@acme.io"));
    }

    #[test]
    fn test_env_page_size_must_be_numeric() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env_from(|k| (k == "JIRA_PAGE_SIZE").then(|| "fifty".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { ref field, .. } if field == "JIRA_PAGE_SIZE"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.apply_env_from(no_env).unwrap();
        assert!(matches!(
            config.validate(),
            Err(Error::MissingConfigField { ref field }) if field == "jira.subdomain"
        ));

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.jira.subdomain = Some("Acme Corp".to_string());
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfigValue { .. })
        ));

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.jira.api_token = None;
        assert!(matches!(
            config.validate(),
            Err(Error::MissingConfigField { ref field }) if field == "jira.api_token"
        ));

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.jira.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.http.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        config.http.retry_delay_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = PipelineConfig::from_yaml("jira: [not, a, map]").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.jira.email.as_deref(), Some("me@acme.io"));
        assert!(config.credentials().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load("/nonexistent/jira-pipeline.yaml").unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
