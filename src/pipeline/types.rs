//! Pipeline types
//!
//! Settings and run reports for the extraction pipeline.

use crate::transform::{LoadedEntities, TransformReport};
use crate::types::{DataSelection, FailurePolicy};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// JQL used for issues when none is configured
pub const DEFAULT_ISSUE_QUERY: &str = r#"updated >= "-5d""#;

/// Configuration for pipeline runs
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Site root, e.g. `https://acme.atlassian.net`
    pub base_url: String,
    /// Records requested per page
    pub page_size: u32,
    /// Issues loaded per run before stopping (0 = unlimited); other
    /// entities are never truncated
    pub max_issues: usize,
    /// JQL queries run for issues, in order
    pub issue_queries: Vec<String>,
    /// Use the token-paginated search endpoint for issues
    pub use_search_endpoint: bool,
    /// Failure policy per entity; unlisted entities are soft
    pub failure_policies: BTreeMap<String, FailurePolicy>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: 50,
            max_issues: 10_000,
            issue_queries: vec![DEFAULT_ISSUE_QUERY.to_string()],
            use_search_endpoint: true,
            failure_policies: BTreeMap::from([("issues".to_string(), FailurePolicy::Hard)]),
        }
    }
}

impl PipelineSettings {
    /// Settings for a site
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set page size
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Set the issue safety limit
    #[must_use]
    pub fn with_max_issues(mut self, max: usize) -> Self {
        self.max_issues = max;
        self
    }

    /// Set the issue queries
    #[must_use]
    pub fn with_issue_queries(mut self, queries: Vec<String>) -> Self {
        self.issue_queries = queries;
        self
    }

    /// Choose between the token search endpoint and the classic one
    #[must_use]
    pub fn with_search_endpoint(mut self, enabled: bool) -> Self {
        self.use_search_endpoint = enabled;
        self
    }

    /// Set the failure policy of an entity
    #[must_use]
    pub fn with_failure_policy(mut self, entity: impl Into<String>, policy: FailurePolicy) -> Self {
        self.failure_policies.insert(entity.into(), policy);
        self
    }

    /// Failure policy of an entity
    pub fn policy(&self, entity: &str) -> FailurePolicy {
        self.failure_policies
            .get(entity)
            .copied()
            .unwrap_or_default()
    }
}

/// Outcome of extracting one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReport {
    /// Entity name
    pub entity: String,
    /// Pages delivered to the sink
    pub pages: usize,
    /// Records delivered to the sink
    pub records: usize,
    /// Stopped at the max records limit
    pub limit_reached: bool,
    /// When extraction started
    pub started_at: DateTime<Utc>,
    /// Wall time
    pub duration: Duration,
    /// Error message, if the entity failed
    pub error: Option<String>,
}

impl EntityReport {
    /// Start a report
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            pages: 0,
            records: 0,
            limit_reached: false,
            started_at: Utc::now(),
            duration: Duration::zero(),
            error: None,
        }
    }

    /// Count a delivered page
    pub fn add_page(&mut self, records: usize) {
        self.pages += 1;
        self.records += records;
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        self.duration = Utc::now() - self.started_at;
    }

    /// Whether the entity loaded without error
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration.num_milliseconds() as f64 / 1000.0
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// What was selected
    pub selection: DataSelection,
    /// One report per attempted entity, in extraction order
    pub entities: Vec<EntityReport>,
    /// Transform outcome, when transforms ran
    pub transform: Option<TransformReport>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall time
    pub duration: Duration,
}

impl PipelineReport {
    /// Start a report
    pub fn new(selection: DataSelection) -> Self {
        Self {
            selection,
            entities: Vec::new(),
            transform: None,
            started_at: Utc::now(),
            duration: Duration::zero(),
        }
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        self.duration = Utc::now() - self.started_at;
    }

    /// Report of one entity
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity == name)
    }

    /// Whether every entity loaded
    pub fn succeeded(&self) -> bool {
        self.entities.iter().all(EntityReport::succeeded)
    }

    /// Entities that failed
    pub fn failed(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| !e.succeeded())
            .map(|e| e.entity.as_str())
            .collect()
    }

    /// Records delivered across entities
    pub fn total_records(&self) -> usize {
        self.entities.iter().map(|e| e.records).sum()
    }

    /// Pages delivered across entities
    pub fn total_pages(&self) -> usize {
        self.entities.iter().map(|e| e.pages).sum()
    }

    /// Source tables refreshed by this run
    pub fn loaded(&self) -> LoadedEntities {
        let ok = |name: &str| self.entity(name).is_some_and(EntityReport::succeeded);
        LoadedEntities {
            projects: ok("projects"),
            users: ok("users"),
        }
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration.num_milliseconds() as f64 / 1000.0
    }
}
