//! CLI module
//!
//! Command-line interface for running the pipeline.
//!
//! # Commands
//!
//! - `run` - Extract, load, then transform
//! - `extract` - Extract and load only
//! - `transform` - Run a dbt command against the warehouse
//! - `entities` - List extractable entities
//! - `validate` - Check configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
