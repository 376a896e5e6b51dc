// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Jira Pipeline
//!
//! Extracts Jira Cloud entities over the REST API into DuckDB, then runs
//! dbt over the loaded tables.
//!
//! ## Features
//!
//! - **Paginated Extraction**: Offset, flag-driven and token pagination
//! - **Retry and Pacing**: Exponential backoff plus a fixed inter-page delay
//! - **Streaming Loads**: Every page is upserted as soon as it arrives
//! - **Transforms**: dbt deps, run, test and docs after each load
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jira_pipeline::{cli::Runner, DataSelection, PipelineConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = PipelineConfig::load("jira.yaml")?;
//!     let pipeline = Runner::build_pipeline(&config, true)?;
//!
//!     let report = pipeline.run_full(DataSelection::All, None).await?;
//!     println!("{} records", report.total_records());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Pipeline                              │
//! │  extract(selection) → PipelineReport    run_full() → + dbt      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌───────────┬──────────────────┴──┬──────────────┬───────────────┐
//! │ Resources │     Pagination      │    Sink      │   Transform   │
//! ├───────────┼─────────────────────┼──────────────┼───────────────┤
//! │ issues    │ Offset              │ DuckDB       │ dbt deps      │
//! │ users     │ FlagDriven          │ upsert/append│ dbt run/test  │
//! │ projects  │ NextPageToken       │              │ dbt docs      │
//! │ workflows │ Retry / Page delay  │              │               │
//! └───────────┴─────────────────────┴──────────────┴───────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Common types and type aliases
pub mod types;

/// Jira basic-auth credentials
pub mod auth;

/// HTTP fetcher with retry and pacing
pub mod http;

/// Record extraction from response bodies
pub mod decode;

/// Pagination controller
pub mod pagination;

/// Entity endpoint definitions
pub mod resources;

/// Record sinks (DuckDB, in-memory)
pub mod sink;

/// dbt transform runner
pub mod transform;

/// Extraction orchestration
pub mod pipeline;

/// Configuration loading
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use http::{HttpFetcher, PageDelay, PageSource, RetryPolicy};
pub use pagination::{PageResult, PaginationController, PaginationMode};
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings};
pub use resources::{EndpointSpec, ResourceTable};
pub use sink::{DuckDbSink, MemorySink, RecordSink};
pub use transform::{TransformConfig, TransformRunner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
