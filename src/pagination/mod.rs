//! Pagination module
//!
//! Supports: Offset (`startAt`/`maxResults`), flag-driven offset
//! (`isLast`/`hasMore`), server `nextPage` jumps and opaque page tokens.
//!
//! # Overview
//!
//! A [`PaginationController`] owns the state of one extraction run. Each call
//! to [`PaginationController::next_page`] fetches one page through a
//! [`crate::http::PageSource`] (with retry), extracts its records, and works
//! out where the next page starts. Pages are produced lazily and strictly in
//! order; the run ends on an empty page, a terminal flag, or a short page.

mod controller;
mod types;

pub use controller::PaginationController;
pub use types::{
    is_truthy, next_page_offset, NextPage, PageResult, PaginationMode, PaginationState,
    HAS_MORE_FIELD, IS_LAST_FIELD, MAX_RESULTS_PARAM, NEXT_PAGE_FIELD, START_AT_PARAM,
};
