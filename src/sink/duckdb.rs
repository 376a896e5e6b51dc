//! DuckDB warehouse sink
//!
//! Each entity gets one table inside the configured schema. Keyed entities
//! are merged with `INSERT ... ON CONFLICT DO UPDATE`; key-less entities are
//! appended. The raw record is stored as a JSON document so nested Jira
//! payloads survive untouched for downstream models.

use super::{dedupe_by_key, validate_identifier, RecordSink};
use crate::error::{Error, Result};
use crate::types::Record;
use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Schema used when none is configured
pub const DEFAULT_SCHEMA: &str = "jira_data";

struct Inner {
    conn: Connection,
    /// Tables created by this process
    tables: HashSet<String>,
}

/// Writes pages into a DuckDB database
pub struct DuckDbSink {
    inner: Mutex<Inner>,
    schema: String,
    location: String,
}

impl DuckDbSink {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            Error::sink(format!(
                "Failed to open DuckDB database {}: {e}",
                path.display()
            ))
        })?;

        Self::with_connection(conn, schema, path.display().to_string())
    }

    /// Create an in-memory database
    pub fn in_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::sink(format!("Failed to create DuckDB connection: {e}")))?;
        Self::with_connection(conn, schema, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, schema: &str, location: String) -> Result<Self> {
        let schema = validate_identifier(schema)?.to_string();
        conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {schema};"))
            .map_err(|e| Error::sink(format!("Failed to create schema {schema}: {e}")))?;

        debug!(location = %location, schema = %schema, "Opened DuckDB warehouse");

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                tables: HashSet::new(),
            }),
            schema,
            location,
        })
    }

    /// Schema holding the entity tables
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Database file, or `:memory:`
    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::sink("DuckDB connection lock poisoned"))
    }

    fn table_name(&self, entity: &str) -> Result<String> {
        Ok(format!("{}.{}", self.schema, validate_identifier(entity)?))
    }

    fn ensure_table(&self, inner: &mut Inner, entity: &str, keyed: bool) -> Result<String> {
        let table = self.table_name(entity)?;
        if inner.tables.contains(&table) {
            return Ok(table);
        }

        let ddl = if keyed {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 _key VARCHAR PRIMARY KEY, \
                 _loaded_at VARCHAR NOT NULL, \
                 data VARCHAR NOT NULL);"
            )
        } else {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 _loaded_at VARCHAR NOT NULL, \
                 data VARCHAR NOT NULL);"
            )
        };
        inner
            .conn
            .execute_batch(&ddl)
            .map_err(|e| Error::sink(format!("Failed to create table {table}: {e}")))?;

        inner.tables.insert(table.clone());
        Ok(table)
    }

    fn table_exists(&self, conn: &Connection, entity: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
            params![self.schema.as_str(), entity],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Tables in the schema
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? ORDER BY table_name",
        )?;
        let tables = stmt
            .query_map(params![self.schema.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    /// Stored documents of an entity
    pub fn fetch_records(&self, entity: &str) -> Result<Vec<Record>> {
        let table = self.table_name(entity)?;
        let inner = self.lock()?;
        if !self.table_exists(&inner.conn, entity)? {
            return Ok(Vec::new());
        }

        let mut stmt = inner.conn.prepare(&format!("SELECT data FROM {table}"))?;
        let documents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|doc| {
                serde_json::from_str(doc)
                    .map_err(|e| Error::sink(format!("Corrupt document in {table}: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl RecordSink for DuckDbSink {
    async fn write_page(
        &self,
        entity: &str,
        upsert_key: Option<&str>,
        records: &[Record],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let loaded_at = Utc::now().to_rfc3339();
        let mut inner = self.lock()?;
        let table = self.ensure_table(&mut inner, entity, upsert_key.is_some())?;

        let tx = inner.conn.transaction()?;
        let written = match upsert_key {
            Some(key) => {
                let rows = dedupe_by_key(entity, key, records)?;
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {table} (_key, _loaded_at, data) VALUES (?, ?, ?) \
                     ON CONFLICT (_key) DO UPDATE SET \
                     _loaded_at = excluded._loaded_at, data = excluded.data"
                ))?;
                for (value, record) in &rows {
                    let data = record.to_string();
                    stmt.execute(params![value.as_str(), loaded_at.as_str(), data.as_str()])?;
                }
                rows.len()
            }
            None => {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {table} (_loaded_at, data) VALUES (?, ?)"
                ))?;
                for record in records {
                    let data = record.to_string();
                    stmt.execute(params![loaded_at.as_str(), data.as_str()])?;
                }
                records.len()
            }
        };
        tx.commit()?;

        debug!(table = %table, rows = written, "Wrote page");
        Ok(written)
    }

    async fn count(&self, entity: &str) -> Result<usize> {
        let table = self.table_name(entity)?;
        let inner = self.lock()?;
        if !self.table_exists(&inner.conn, entity)? {
            return Ok(0);
        }
        let count: i64 =
            inner
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl std::fmt::Debug for DuckDbSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbSink")
            .field("location", &self.location)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
