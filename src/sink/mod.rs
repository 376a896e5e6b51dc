//! Record sinks
//!
//! Pages are pushed to a sink as soon as they are extracted, one call per
//! page. Entities with an upsert key are merged on that key, so re-running
//! an overlapping time window never duplicates rows.
//!
//! # Sinks
//!
//! - [`DuckDbSink`]: one table per entity inside a DuckDB schema
//! - [`MemorySink`]: in-process store, handy for dry runs and tests

mod duckdb;
mod memory;

pub use self::duckdb::{DuckDbSink, DEFAULT_SCHEMA};
pub use memory::MemorySink;

use crate::error::{Error, Result};
use crate::types::{query_value, Record};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Destination for extracted pages
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store one page, merging on `upsert_key` when given
    ///
    /// Returns the number of records written.
    async fn write_page(
        &self,
        entity: &str,
        upsert_key: Option<&str>,
        records: &[Record],
    ) -> Result<usize>;

    /// Rows currently stored for an entity
    async fn count(&self, entity: &str) -> Result<usize>;
}

/// Bare SQL identifier
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
});

/// Check that a name can be used as a bare SQL identifier
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(Error::sink(format!("'{name}' is not a valid table name")))
    }
}

/// Value of the upsert key of a record
pub(crate) fn record_key(entity: &str, key: &str, record: &Record) -> Result<String> {
    match record.get(key) {
        Some(value) if !value.is_null() => Ok(query_value(value)),
        _ => Err(Error::sink(format!(
            "record of '{entity}' has no value for upsert key '{key}'"
        ))),
    }
}

/// Collapse duplicate keys inside one page, keeping the last occurrence
///
/// Rows keep the position of the first occurrence of their key.
pub(crate) fn dedupe_by_key<'a>(
    entity: &str,
    key: &str,
    records: &'a [Record],
) -> Result<Vec<(String, &'a Record)>> {
    let mut rows: Vec<(String, &Record)> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for record in records {
        let value = record_key(entity, key, record)?;
        match index.get(&value) {
            Some(&i) => rows[i].1 = record,
            None => {
                index.insert(value.clone(), rows.len());
                rows.push((value, record));
            }
        }
    }
    Ok(rows)
}
