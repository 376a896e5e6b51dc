//! Resource definition table
//!
//! Static description of the Jira entities the pipeline knows how to pull:
//! where they live, which query parameters they need, where the records sit
//! in the response, and which field identifies a record.

use crate::error::{Error, Result};
use crate::pagination::PaginationMode;
use crate::types::QueryParams;

/// `api_path` value that selects the classic issue search endpoint
pub const SEARCH_SENTINEL: &str = "jql";

/// Path the sentinel resolves to
pub const SEARCH_PATH: &str = "rest/api/3/search";

/// Enhanced JQL search endpoint (token paginated)
pub const SEARCH_JQL_PATH: &str = "rest/api/3/search/jql";

/// Field list requested for issues
const ISSUE_FIELDS: &str = "*all";

/// Expansions requested for issues
const ISSUE_EXPAND: &str = "fields,changelog,operations,transitions,names";

/// How to extract one logical entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Logical entity name (`issues`, `users`, ...)
    pub name: String,
    /// Absolute URL, path relative to the site, or [`SEARCH_SENTINEL`]
    pub api_path: String,
    /// Query parameters sent on every request
    pub default_params: QueryParams,
    /// Key holding the result array
    pub data_path: Option<String>,
    /// Field identifying a record for upserts
    pub upsert_key: Option<String>,
    /// Pagination dialect
    pub mode: PaginationMode,
}

impl EndpointSpec {
    /// Create an offset-paginated endpoint
    pub fn new(name: impl Into<String>, api_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_path: api_path.into(),
            default_params: QueryParams::new(),
            data_path: None,
            upsert_key: None,
            mode: PaginationMode::Offset,
        }
    }

    /// Add a default query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_params.insert(key.into(), value.into());
        self
    }

    /// Set the data path
    #[must_use]
    pub fn data_path(mut self, path: impl Into<String>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    /// Set the upsert key
    #[must_use]
    pub fn upsert_key(mut self, key: impl Into<String>) -> Self {
        self.upsert_key = Some(key.into());
        self
    }

    /// Set the pagination mode
    #[must_use]
    pub fn mode(mut self, mode: PaginationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Issues through the enhanced search endpoint for one JQL query
    pub fn issue_search(jql: impl Into<String>) -> Self {
        Self::new("issues", SEARCH_JQL_PATH)
            .param("fields", ISSUE_FIELDS)
            .param("expand", ISSUE_EXPAND)
            .param("validateQuery", "strict")
            .param("jql", jql)
            .data_path("issues")
            .upsert_key("id")
            .mode(PaginationMode::next_page_token("nextPageToken"))
    }

    /// Whether this endpoint uses the classic search sentinel
    ///
    /// Sentinel runs always start at offset 0 with the configured page size,
    /// whatever the default params say.
    pub fn is_search_sentinel(&self) -> bool {
        self.api_path == SEARCH_SENTINEL
    }

    /// Request URL on the given site
    pub fn url(&self, base_url: &str) -> Result<String> {
        resolve_url(base_url, &self.api_path)
    }
}

/// Build the request URL for an `api_path`
///
/// - the search sentinel maps to [`SEARCH_PATH`]
/// - absolute URLs are used as-is
/// - anything else is joined onto the site root
pub fn resolve_url(base_url: &str, api_path: &str) -> Result<String> {
    let url = if api_path == SEARCH_SENTINEL {
        format!("{}/{}", base_url.trim_end_matches('/'), SEARCH_PATH)
    } else if api_path.starts_with("http://") || api_path.starts_with("https://") {
        api_path.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            api_path.trim_start_matches('/')
        )
    };

    url::Url::parse(&url)?;
    Ok(url)
}

/// Read-only table of endpoints, in extraction order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTable {
    specs: Vec<EndpointSpec>,
}

impl ResourceTable {
    /// Build a table; a later spec replaces an earlier one of the same name
    pub fn new(specs: impl IntoIterator<Item = EndpointSpec>) -> Self {
        let mut table: Vec<EndpointSpec> = Vec::new();
        for spec in specs {
            match table.iter_mut().find(|s| s.name == spec.name) {
                Some(existing) => *existing = spec,
                None => table.push(spec),
            }
        }
        Self { specs: table }
    }

    /// The Jira Cloud endpoints
    pub fn jira_default() -> Self {
        Self::new([
            EndpointSpec::new("issues", SEARCH_SENTINEL)
                .param("fields", ISSUE_FIELDS)
                .param("expand", ISSUE_EXPAND)
                .param("validateQuery", "strict")
                .param("jql", "updated >= -90d")
                .data_path("issues")
                .upsert_key("id"),
            EndpointSpec::new("users", "rest/api/3/users")
                .param("includeInactiveUsers", "true")
                .upsert_key("accountId"),
            EndpointSpec::new("workflows", "/rest/api/3/workflow/search")
                .data_path("values")
                .mode(PaginationMode::FlagDriven),
            EndpointSpec::new("projects", "rest/api/3/project/search")
                .param("status", "live,archived,deleted")
                .param(
                    "expand",
                    "description,lead,issueTypes,url,projectKeys,permissions,insight",
                )
                .data_path("values")
                .upsert_key("id")
                .mode(PaginationMode::FlagDriven),
        ])
    }

    /// Look up an entity
    pub fn get(&self, name: &str) -> Result<&EndpointSpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnknownEntity {
                name: name.to_string(),
            })
    }

    /// Entity names, in table order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Iterate over the endpoints
    pub fn iter(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.specs.iter()
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::jira_default()
    }
}
