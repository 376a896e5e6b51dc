//! Common types used throughout the pipeline
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// One extracted record: an arbitrary key-valued JSON document
pub type Record = JsonValue;

/// Ordered query parameters
pub type QueryParams = BTreeMap<String, String>;

// ============================================================================
// Failure Policy
// ============================================================================

/// What the orchestrator does when one entity's extraction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and continue with the remaining entities
    #[default]
    Soft,
    /// Abort the whole pipeline
    Hard,
}

// ============================================================================
// Data Selection
// ============================================================================

/// Which entities a pipeline run extracts
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DataSelection {
    /// Projects, users and issues, in that order
    #[default]
    All,
    Issues,
    Projects,
    Users,
    Workflows,
}

impl DataSelection {
    /// Logical entity names covered by this selection, in extraction order
    pub fn entities(self) -> &'static [&'static str] {
        match self {
            Self::All => &["projects", "users", "issues"],
            Self::Issues => &["issues"],
            Self::Projects => &["projects"],
            Self::Users => &["users"],
            Self::Workflows => &["workflows"],
        }
    }

    /// Name used in logs and pipeline reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Issues => "issues",
            Self::Projects => "projects",
            Self::Users => "users",
            Self::Workflows => "workflows",
        }
    }
}

/// Render a JSON parameter value the way it goes on the query string
pub fn query_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
