//! Pagination types
//!
//! Defines the pagination dialects, the per-run state and the page handed
//! to callers.

use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};

/// Query parameter carrying the zero-based offset
pub const START_AT_PARAM: &str = "startAt";
/// Query parameter carrying the page size
pub const MAX_RESULTS_PARAM: &str = "maxResults";
/// Response flag: this was the final page
pub const IS_LAST_FIELD: &str = "isLast";
/// Response field: where the next page starts
pub const NEXT_PAGE_FIELD: &str = "nextPage";
/// Response flag: more pages follow
pub const HAS_MORE_FIELD: &str = "hasMore";

/// Pagination dialect of an endpoint, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaginationMode {
    /// `startAt`/`maxResults`; a short page ends the run
    #[default]
    Offset,

    /// Offset paging where an explicit `isLast`/`hasMore` flag, when
    /// present, overrides the short-page heuristic
    FlagDriven,

    /// Opaque continuation token issued by the server
    NextPageToken {
        /// Query parameter the token is sent back in
        param: String,
        /// Response field the token is read from
        field: String,
    },
}

impl PaginationMode {
    /// Token paging using the same name for the parameter and the field
    pub fn next_page_token(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::NextPageToken {
            param: name.clone(),
            field: name,
        }
    }

    /// Whether this mode advances by offset
    pub fn uses_offset(&self) -> bool {
        !matches!(self, Self::NextPageToken { .. })
    }
}

/// Result of handling one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// More pages; `delay` says whether to pause before fetching
    Continue {
        /// Sleep the inter-page delay first
        delay: bool,
    },
    /// No more pages
    Done,
}

/// Tracks pagination state during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    /// Offset sent on the next request
    pub offset: u64,
    /// Continuation token sent on the next request
    pub cursor: Option<String>,
    /// Requested page size (always > 0)
    pub page_size: u32,
    /// Is pagination complete?
    pub exhausted: bool,
    /// Non-empty pages yielded so far
    pub pages_fetched: u64,
    /// Records yielded so far
    pub records_fetched: u64,
}

impl PaginationState {
    /// Create a fresh state
    pub fn new(page_size: u32) -> Self {
        Self {
            offset: 0,
            cursor: None,
            page_size: page_size.max(1),
            exhausted: false,
            pages_fetched: 0,
            records_fetched: 0,
        }
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.exhausted = true;
    }

    /// Advance past the records of the last page
    pub fn add_offset(&mut self, amount: u64) {
        self.offset += amount;
    }

    /// Move to a server-chosen offset
    pub fn jump_to(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Count a yielded page
    pub fn record_page(&mut self, records: usize) {
        self.pages_fetched += 1;
        self.records_fetched += records as u64;
    }
}

/// One page of records
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// Extracted records, in server order
    pub records: Vec<Record>,
    /// The full response body
    pub raw_response: JsonValue,
    /// True when no further page will be requested
    pub is_terminal: bool,
}

impl PageResult {
    /// Number of records in the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Truthiness of a response flag
///
/// `null`, `false`, `0`, `""` and empty containers are false.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// Interpret a `nextPage` value as the next offset
///
/// Accepts an integer, an integer string, or a URL whose query carries
/// `startAt`.
pub fn next_page_offset(value: &JsonValue) -> Result<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::malformed(format!("nextPage is not a valid offset: {n}"))),
        JsonValue::String(s) => {
            if let Ok(offset) = s.trim().parse::<u64>() {
                return Ok(offset);
            }
            let url = url::Url::parse(s)
                .map_err(|e| Error::malformed(format!("nextPage '{s}' is unusable: {e}")))?;
            url.query_pairs()
                .find(|(k, _)| k == START_AT_PARAM)
                .and_then(|(_, v)| v.parse::<u64>().ok())
                .ok_or_else(|| {
                    Error::malformed(format!("nextPage URL '{s}' carries no {START_AT_PARAM}"))
                })
        }
        other => Err(Error::malformed(format!(
            "nextPage has unsupported value {other}"
        ))),
    }
}
