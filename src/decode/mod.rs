//! Response decoding module
//!
//! Parses response bodies and locates the records of a page.
//!
//! # Overview
//!
//! Resolution order, first match wins:
//! 1. the configured data path, when it is a key of the body
//! 2. the body itself, when it is an array
//! 3. the `values` key
//! 4. the body as-is

mod extractor;

pub use extractor::{extract_records, parse_body, resolve_rule, ExtractionRule};
