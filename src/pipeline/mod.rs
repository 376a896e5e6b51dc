//! Pipeline module
//!
//! Orchestrates extraction runs and the transforms that follow them.
//!
//! # Overview
//!
//! The pipeline module provides:
//! - `Pipeline` - Runs entities through pagination into a sink
//! - `PipelineSettings` - Page size, issue queries, limits and failure policies
//! - `EntityReport` / `PipelineReport` - What each run delivered
//!
//! Entities run one after another. Every page goes to the sink as soon as it
//! is extracted, so a failure keeps whatever was already delivered.

mod types;

pub use types::{EntityReport, PipelineReport, PipelineSettings, DEFAULT_ISSUE_QUERY};

use crate::error::{Error, Result};
use crate::http::{PageDelay, PageSource, RetryPolicy};
use crate::pagination::PaginationController;
use crate::resources::{EndpointSpec, ResourceTable};
use crate::sink::RecordSink;
use crate::transform::{TransformReport, TransformRunner};
use crate::types::{DataSelection, FailurePolicy};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Extraction pipeline over a resource table
pub struct Pipeline {
    table: ResourceTable,
    source: Arc<dyn PageSource>,
    sink: Arc<dyn RecordSink>,
    retry: RetryPolicy,
    delay: PageDelay,
    settings: PipelineSettings,
    transform: Option<TransformRunner>,
}

impl Pipeline {
    /// Create a pipeline over the Jira resource table
    pub fn new(
        source: Arc<dyn PageSource>,
        sink: Arc<dyn RecordSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            table: ResourceTable::jira_default(),
            source,
            sink,
            retry: RetryPolicy::default(),
            delay: PageDelay::default(),
            settings,
            transform: None,
        }
    }

    /// Replace the resource table
    #[must_use]
    pub fn with_table(mut self, table: ResourceTable) -> Self {
        self.table = table;
        self
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

    /// Run transforms after loads
    #[must_use]
    pub fn with_transform(mut self, runner: TransformRunner) -> Self {
        self.transform = Some(runner);
        self
    }

    /// Get the settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Get the resource table
    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    /// Endpoints to walk for an entity
    ///
    /// Issues run once per configured JQL query.
    pub fn endpoints(&self, entity: &str) -> Result<Vec<EndpointSpec>> {
        let spec = self.table.get(entity)?;
        if entity != "issues" || self.settings.issue_queries.is_empty() {
            return Ok(vec![spec.clone()]);
        }

        Ok(self
            .settings
            .issue_queries
            .iter()
            .map(|jql| {
                if self.settings.use_search_endpoint {
                    EndpointSpec::issue_search(jql.clone())
                } else {
                    spec.clone().param("jql", jql.clone())
                }
            })
            .collect())
    }

    /// Build the controller for one endpoint run
    pub fn controller(&self, spec: &EndpointSpec) -> Result<PaginationController> {
        let url = spec.url(&self.settings.base_url)?;
        let controller = PaginationController::new(
            Arc::clone(&self.source),
            url,
            spec.default_params.clone(),
            spec.mode.clone(),
            self.settings.page_size,
        )
        .with_retry(self.retry.clone())
        .with_delay(self.delay.clone())
        .with_data_path(spec.data_path.clone());

        Ok(if spec.is_search_sentinel() {
            controller.force_first_page(self.settings.page_size)
        } else {
            controller
        })
    }

    /// Extract one entity into the sink
    pub async fn extract_entity(&self, entity: &str) -> Result<EntityReport> {
        let (report, result) = self.load(entity).await;
        result
            .map(|()| report)
            .map_err(|e| Error::extraction(entity, e))
    }

    async fn load(&self, entity: &str) -> (EntityReport, Result<()>) {
        let mut report = EntityReport::new(entity);
        info!(entity, "Extracting");

        let result = self.load_pages(entity, &mut report).await;
        report.finish();

        match &result {
            Ok(()) => info!(
                entity,
                pages = report.pages,
                records = report.records,
                secs = report.duration_secs(),
                "Extracted"
            ),
            Err(e) => {
                error!(
                    entity,
                    pages = report.pages,
                    records = report.records,
                    error = %e,
                    "Extraction failed; pages already delivered are kept"
                );
                report.error = Some(e.to_string());
            }
        }
        (report, result)
    }

    async fn load_pages(&self, entity: &str, report: &mut EntityReport) -> Result<()> {
        let limit = if entity == "issues" {
            self.settings.max_issues
        } else {
            0
        };

        for spec in self.endpoints(entity)? {
            debug!(entity, api_path = %spec.api_path, mode = ?spec.mode, "Walking endpoint");
            let pages = self.controller(&spec)?.into_stream();
            futures::pin_mut!(pages);

            while let Some(page) = pages.try_next().await? {
                let mut records = page.records;
                if limit > 0 && report.records + records.len() >= limit {
                    records.truncate(limit - report.records);
                    report.limit_reached = true;
                }

                self.sink
                    .write_page(entity, spec.upsert_key.as_deref(), &records)
                    .await?;
                report.add_page(records.len());

                if report.limit_reached {
                    warn!(entity, limit, "Reached max issues per run, stopping");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Extract every entity of a selection
    ///
    /// A soft failure is recorded and the run moves on; a hard failure
    /// aborts with [`Error::Extraction`].
    pub async fn extract(&self, selection: DataSelection) -> Result<PipelineReport> {
        let mut report = PipelineReport::new(selection);
        info!(selection = selection.as_str(), "Starting extraction");

        for entity in selection.entities() {
            let (entity_report, result) = self.load(entity).await;
            report.entities.push(entity_report);

            if let Err(e) = result {
                if self.settings.policy(entity) == FailurePolicy::Hard {
                    return Err(Error::extraction(*entity, e));
                }
                warn!(entity, "Continuing with remaining entities");
            }
        }

        report.finish();
        info!(
            selection = selection.as_str(),
            pages = report.total_pages(),
            records = report.total_records(),
            failed = ?report.failed(),
            secs = report.duration_secs(),
            "Extraction finished"
        );
        Ok(report)
    }

    /// Extract a selection, then run transforms
    ///
    /// Without a command the full post-load sequence runs; with one, only
    /// that dbt command.
    pub async fn run_full(
        &self,
        selection: DataSelection,
        dbt_command: Option<&str>,
    ) -> Result<PipelineReport> {
        let mut report = self.extract(selection).await?;

        let Some(runner) = self.transform.as_ref().filter(|r| r.config().enabled) else {
            info!("Transforms disabled");
            return Ok(report);
        };

        let transform = match dbt_command {
            Some(command) => runner.run_command(command).await?,
            None => runner.run_after_load(report.loaded()).await?,
        };
        report.transform = Some(transform);
        report.finish();
        Ok(report)
    }

    /// Run a dbt command without extracting
    pub async fn run_transform_only(&self, command: &str) -> Result<TransformReport> {
        let runner = self
            .transform
            .as_ref()
            .ok_or_else(|| Error::config("no transform configured"))?;
        runner.run_command(command).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("entities", &self.table.names().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
