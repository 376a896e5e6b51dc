//! In-memory sink

use super::{dedupe_by_key, RecordSink};
use crate::error::{Error, Result};
use crate::types::Record;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct EntityRows {
    rows: Vec<Record>,
    index: HashMap<String, usize>,
    page_sizes: Vec<usize>,
}

/// Keeps every entity in process memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entities: Mutex<BTreeMap<String, EntityRows>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored rows of an entity, in first-seen order
    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.entities
            .lock()
            .ok()
            .and_then(|e| e.get(entity).map(|rows| rows.rows.clone()))
            .unwrap_or_default()
    }

    /// Size of every page written for an entity, in delivery order
    pub fn page_sizes(&self, entity: &str) -> Vec<usize> {
        self.entities
            .lock()
            .ok()
            .and_then(|e| e.get(entity).map(|rows| rows.page_sizes.clone()))
            .unwrap_or_default()
    }

    /// Entities that received at least one page
    pub fn entities(&self) -> Vec<String> {
        self.entities
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write_page(
        &self,
        entity: &str,
        upsert_key: Option<&str>,
        records: &[Record],
    ) -> Result<usize> {
        let mut entities = self
            .entities
            .lock()
            .map_err(|_| Error::sink("memory sink lock poisoned"))?;
        let table = entities.entry(entity.to_string()).or_default();

        match upsert_key {
            Some(key) => {
                for (value, record) in dedupe_by_key(entity, key, records)? {
                    match table.index.get(&value) {
                        Some(&i) => table.rows[i] = record.clone(),
                        None => {
                            table.index.insert(value, table.rows.len());
                            table.rows.push(record.clone());
                        }
                    }
                }
            }
            None => table.rows.extend_from_slice(records),
        }

        table.page_sizes.push(records.len());
        Ok(records.len())
    }

    async fn count(&self, entity: &str) -> Result<usize> {
        Ok(self
            .entities
            .lock()
            .map_err(|_| Error::sink("memory sink lock poisoned"))?
            .get(entity)
            .map_or(0, |rows| rows.rows.len()))
    }
}
