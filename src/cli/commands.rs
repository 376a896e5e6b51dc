//! CLI commands and argument parsing

use crate::types::DataSelection;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Jira extraction pipeline CLI
#[derive(Parser, Debug)]
#[command(name = "jira-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML); `JIRA_*` variables override it
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, load into the warehouse, then run transforms
    Run {
        /// Entities to extract
        #[arg(long, value_enum, default_value = "all")]
        data_type: DataSelection,

        /// Run only this dbt command after loading (e.g. "run", "test")
        #[arg(long)]
        dbt_command: Option<String>,

        /// Load without running transforms
        #[arg(long)]
        skip_transform: bool,
    },

    /// Extract and load without transforms
    Extract {
        /// Entities to extract
        #[arg(long, value_enum, default_value = "all")]
        data_type: DataSelection,
    },

    /// Run a dbt command against the existing warehouse
    Transform {
        /// dbt command and arguments
        #[arg(long, default_value = "run")]
        dbt_command: String,
    },

    /// List the entities this pipeline knows how to extract
    Entities,

    /// Validate configuration
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
