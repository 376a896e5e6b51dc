//! Pagination controller
//!
//! The state machine that drives fetch → extract → yield → advance until
//! the endpoint is exhausted. Requests are strictly sequential: request N+1
//! is only built once page N has been handled.

use super::types::{
    is_truthy, next_page_offset, NextPage, PageResult, PaginationMode, PaginationState,
    HAS_MORE_FIELD, IS_LAST_FIELD, MAX_RESULTS_PARAM, NEXT_PAGE_FIELD, START_AT_PARAM,
};
use crate::decode::extract_records;
use crate::error::{Error, Result};
use crate::http::{PageDelay, PageRequest, PageSource, RetryPolicy};
use crate::types::{JsonValue, QueryParams};
use futures::Stream;
use std::sync::Arc;
use tracing::debug;

/// Drives one extraction run over a paginated endpoint
pub struct PaginationController {
    source: Arc<dyn PageSource>,
    retry: RetryPolicy,
    delay: PageDelay,
    url: String,
    params: QueryParams,
    data_path: Option<String>,
    mode: PaginationMode,
    state: PaginationState,
    pending_delay: bool,
    deferred: Option<Error>,
}

impl PaginationController {
    /// Create a controller
    ///
    /// Offset modes seed `startAt`/`maxResults` only when `params` lacks
    /// them; token mode seeds `maxResults` only. The effective page size is
    /// the `maxResults` that will be sent.
    pub fn new(
        source: Arc<dyn PageSource>,
        url: impl Into<String>,
        mut params: QueryParams,
        mode: PaginationMode,
        page_size: u32,
    ) -> Self {
        let mut state = PaginationState::new(page_size);

        params
            .entry(MAX_RESULTS_PARAM.to_string())
            .or_insert_with(|| state.page_size.to_string());

        if mode.uses_offset() {
            let start = params
                .entry(START_AT_PARAM.to_string())
                .or_insert_with(|| "0".to_string());
            state.offset = start.parse().unwrap_or(0);
        }

        if let Some(size) = params
            .get(MAX_RESULTS_PARAM)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            state.page_size = size;
        }

        Self {
            source,
            retry: RetryPolicy::default(),
            delay: PageDelay::default(),
            url: url.into(),
            params,
            data_path: None,
            mode,
            state,
            pending_delay: false,
            deferred: None,
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the inter-page delay
    #[must_use]
    pub fn with_delay(mut self, delay: PageDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Set the key holding the result array
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }

    /// Always start from offset 0 with the configured page size
    ///
    /// Used by the search endpoint, which ignores whatever pagination fields
    /// the caller put in its default params.
    #[must_use]
    pub fn force_first_page(mut self, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        self.params
            .insert(START_AT_PARAM.to_string(), "0".to_string());
        self.params
            .insert(MAX_RESULTS_PARAM.to_string(), page_size.to_string());
        self.state.offset = 0;
        self.state.page_size = page_size;
        self
    }

    /// Current pagination state
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// The request the next fetch would send
    pub fn next_request(&self) -> PageRequest {
        let mut query = self.params.clone();
        match &self.mode {
            PaginationMode::NextPageToken { param, .. } => {
                if let Some(cursor) = &self.state.cursor {
                    query.insert(param.clone(), cursor.clone());
                }
            }
            PaginationMode::Offset | PaginationMode::FlagDriven => {
                query.insert(START_AT_PARAM.to_string(), self.state.offset.to_string());
            }
        }
        PageRequest {
            url: self.url.clone(),
            query,
            headers: Default::default(),
        }
    }

    /// Fetch the next non-empty page, or `None` once the run is done
    ///
    /// An error ends the run; pages already returned stay delivered.
    pub async fn next_page(&mut self) -> Result<Option<PageResult>> {
        if let Some(e) = self.deferred.take() {
            self.state.mark_done();
            return Err(e);
        }
        if self.state.exhausted {
            return Ok(None);
        }
        if std::mem::take(&mut self.pending_delay) {
            self.delay.wait().await;
        }

        let request = self.next_request();
        debug!(
            url = %request.url,
            offset = self.state.offset,
            cursor = ?self.state.cursor,
            "Fetching page"
        );

        let source = &self.source;
        let fetched = self
            .retry
            .with_retry(|| source.fetch(&request))
            .await
            .and_then(|raw| {
                let records = extract_records(&raw, self.data_path.as_deref())?;
                Ok((raw, records))
            });

        let (raw, records) = match fetched {
            Ok(page) => page,
            Err(e) => {
                self.state.mark_done();
                return Err(e);
            }
        };

        if records.is_empty() {
            debug!(url = %self.url, "Empty page, pagination complete");
            self.state.mark_done();
            return Ok(None);
        }

        let count = records.len();
        self.state.record_page(count);

        match self.advance(&raw, count) {
            Ok(NextPage::Done) => self.state.mark_done(),
            Ok(NextPage::Continue { delay }) => self.pending_delay = delay,
            Err(e) => self.deferred = Some(e),
        }

        debug!(
            records = count,
            page = self.state.pages_fetched,
            done = self.state.exhausted,
            "Page extracted"
        );

        Ok(Some(PageResult {
            records,
            raw_response: raw,
            is_terminal: self.state.exhausted,
        }))
    }

    /// Decide where the next page starts, or that there is none
    fn advance(&mut self, raw: &JsonValue, count: usize) -> Result<NextPage> {
        if let PaginationMode::NextPageToken { field, .. } = &self.mode {
            if raw.get(IS_LAST_FIELD).is_some_and(is_truthy) {
                return Ok(NextPage::Done);
            }
            return Ok(match raw.get(field.as_str()) {
                Some(JsonValue::String(token)) if !token.is_empty() => {
                    self.state.set_cursor(token.clone());
                    NextPage::Continue { delay: true }
                }
                _ => NextPage::Done,
            });
        }

        if let JsonValue::Object(map) = raw {
            if map.get(IS_LAST_FIELD).is_some_and(is_truthy) {
                return Ok(NextPage::Done);
            }
            if let Some(next) = map.get(NEXT_PAGE_FIELD).filter(|v| !v.is_null()) {
                let offset = next_page_offset(next)?;
                self.state.jump_to(offset);
                return Ok(NextPage::Continue { delay: false });
            }
            if map.get(HAS_MORE_FIELD).is_some_and(|v| !is_truthy(v)) {
                return Ok(NextPage::Done);
            }
        }

        // Only terminal flags end a run early; a short page always ends it
        self.state.add_offset(count as u64);
        if count < self.state.page_size as usize {
            return Ok(NextPage::Done);
        }
        Ok(NextPage::Continue { delay: true })
    }

    /// Turn the controller into a lazy stream of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<PageResult>> + Send {
        futures::stream::try_unfold(self, |mut controller| async move {
            Ok(controller
                .next_page()
                .await?
                .map(|page| (page, controller)))
        })
    }
}

impl std::fmt::Debug for PaginationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationController")
            .field("url", &self.url)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
