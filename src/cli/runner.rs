//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::http::HttpFetcher;
use crate::pagination::PaginationMode;
use crate::pipeline::{EntityReport, Pipeline, PipelineReport};
use crate::resources::ResourceTable;
use crate::transform::{TransformReport, TransformRunner};
use crate::types::DataSelection;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                data_type,
                dbt_command,
                skip_transform,
            } => {
                self.run_pipeline(*data_type, dbt_command.as_deref(), !*skip_transform)
                    .await
            }
            Commands::Extract { data_type } => self.run_pipeline(*data_type, None, false).await,
            Commands::Transform { dbt_command } => self.transform(dbt_command).await,
            Commands::Entities => self.entities(),
            Commands::Validate => self.validate(),
        }
    }

    /// Config file plus environment, not yet validated
    fn read_config(&self) -> Result<PipelineConfig> {
        match &self.cli.config {
            Some(path) => PipelineConfig::read(path),
            None => PipelineConfig::from_env(),
        }
    }

    fn load_config(&self) -> Result<PipelineConfig> {
        let config = self.read_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Wire a pipeline from validated config
    pub fn build_pipeline(config: &PipelineConfig, with_transform: bool) -> Result<Pipeline> {
        let fetcher = HttpFetcher::new(config.fetcher_config(), config.credentials()?)?;
        let sink = config.open_sink()?;
        info!(
            warehouse = sink.location(),
            schema = sink.schema(),
            "Opened warehouse"
        );

        let pipeline = Pipeline::new(
            Arc::new(fetcher),
            Arc::new(sink),
            config.pipeline_settings()?,
        )
        .with_retry(config.retry_policy())
        .with_delay(config.page_delay());

        Ok(if with_transform && config.transform.enabled {
            pipeline.with_transform(TransformRunner::new(config.transform.clone()))
        } else {
            pipeline
        })
    }

    async fn run_pipeline(
        &self,
        selection: DataSelection,
        dbt_command: Option<&str>,
        with_transform: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let pipeline = Self::build_pipeline(&config, with_transform)?;

        let report = pipeline.run_full(selection, dbt_command).await?;
        self.output_message(&report_message(&report));

        if report.succeeded() {
            Ok(())
        } else {
            Err(Error::PartialRun {
                entities: report.failed().into_iter().map(String::from).collect(),
            })
        }
    }

    /// Transforms need no Jira credentials
    async fn transform(&self, command: &str) -> Result<()> {
        let config = self.read_config()?;
        let report = TransformRunner::new(config.transform).run_command(command).await?;

        self.output_message(&json!({
            "type": "TRANSFORM",
            "transform": transform_json(&report),
        }));
        Ok(())
    }

    fn entities(&self) -> Result<()> {
        let table = ResourceTable::jira_default();
        for spec in table.iter() {
            let mode = match &spec.mode {
                PaginationMode::Offset => "offset",
                PaginationMode::FlagDriven => "flag_driven",
                PaginationMode::NextPageToken { .. } => "next_page_token",
            };
            self.output_message(&json!({
                "type": "ENTITY",
                "entity": {
                    "name": spec.name,
                    "api_path": spec.api_path,
                    "data_path": spec.data_path,
                    "upsert_key": spec.upsert_key,
                    "pagination": mode,
                    "in_all": DataSelection::All.entities().contains(&spec.name.as_str()),
                }
            }));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let base_url = config.base_url()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Configuration is valid for {base_url} ({} JQL queries, warehouse {})",
                    config.issues.jql_queries.len(),
                    config.warehouse.path.display()
                )
            }
        }));
        Ok(())
    }

    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn report_message(report: &PipelineReport) -> Value {
    json!({
        "type": "REPORT",
        "report": {
            "selection": report.selection.as_str(),
            "succeeded": report.succeeded(),
            "started_at": report.started_at.to_rfc3339(),
            "duration_secs": report.duration_secs(),
            "pages": report.total_pages(),
            "records": report.total_records(),
            "entities": report.entities.iter().map(entity_json).collect::<Vec<_>>(),
            "transform": report.transform.as_ref().map(transform_json),
        }
    })
}

fn entity_json(entity: &EntityReport) -> Value {
    json!({
        "entity": entity.entity,
        "pages": entity.pages,
        "records": entity.records,
        "limit_reached": entity.limit_reached,
        "duration_secs": entity.duration_secs(),
        "error": entity.error,
    })
}

fn transform_json(report: &TransformReport) -> Value {
    json!({
        "completed": report.completed,
        "skipped": report.skipped,
    })
}
