//! dbt transform runner
//!
//! Runs the dbt project that models the loaded Jira tables. After a load the
//! sequence is `deps` → `run` → `test` → `docs generate`. Tests that need
//! every source table are excluded when projects or users were not loaded.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Tests skipped when the load was partial
const PARTIAL_LOAD_EXCLUDES: [&str; 3] = ["relationships", "source_not_null", "source_unique"];

/// How to invoke dbt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Run transforms after a load
    pub enabled: bool,
    /// Executable to run
    pub program: String,
    /// Directory of the dbt project
    pub project_dir: PathBuf,
    /// `--threads` for run and test
    pub threads: u32,
    /// `--target-path`, also exported as `DBT_TARGET_PATH`
    pub target_path: Option<String>,
    /// Exported as `DBT_LOG_PATH`
    pub log_path: Option<String>,
    /// `--log-level`
    pub log_level: String,
    /// Run `dbt deps` first
    pub install_deps: bool,
    /// Run `dbt test` after `dbt run`
    pub run_tests: bool,
    /// Run `dbt docs generate` last
    pub generate_docs: bool,
    /// Upper bound for docs generation
    pub docs_timeout_secs: u64,
    /// Extra environment for every step
    pub env: BTreeMap<String, String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "dbt".to_string(),
            project_dir: PathBuf::from("dbt"),
            threads: 2,
            target_path: None,
            log_path: None,
            log_level: "info".to_string(),
            install_deps: true,
            run_tests: true,
            generate_docs: true,
            docs_timeout_secs: 300,
            env: BTreeMap::new(),
        }
    }
}

/// Which source tables the last load produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedEntities {
    /// The projects table was loaded in this run
    pub projects: bool,
    /// The users table was loaded in this run
    pub users: bool,
}

impl LoadedEntities {
    /// Both projects and users were loaded
    pub fn all() -> Self {
        Self {
            projects: true,
            users: true,
        }
    }

    /// Whether every source table is fresh
    pub fn is_complete(&self) -> bool {
        self.projects && self.users
    }

    /// Value of `--vars`
    pub fn vars(&self) -> String {
        serde_json::json!({
            "load_projects": self.projects,
            "load_users": self.users,
        })
        .to_string()
    }
}

/// One dbt invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStep {
    /// Step name used in logs and errors
    pub name: String,
    /// Arguments after the program
    pub args: Vec<String>,
    /// A failure is logged and skipped
    pub soft: bool,
    /// Kill the step after this long
    pub timeout: Option<Duration>,
}

impl TransformStep {
    fn new(name: &str, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            args,
            soft: false,
            timeout: None,
        }
    }
}

/// Outcome of a transform sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Steps that exited successfully
    pub completed: Vec<String>,
    /// Soft steps that failed or timed out
    pub skipped: Vec<String>,
}

/// Runs dbt as a child process
#[derive(Debug, Clone)]
pub struct TransformRunner {
    config: TransformConfig,
}

impl TransformRunner {
    /// Create a runner
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Runner configuration
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    fn log_level_args(&self) -> Vec<String> {
        vec!["--log-level".to_string(), self.config.log_level.clone()]
    }

    fn target_args(&self) -> Vec<String> {
        self.config
            .target_path
            .iter()
            .flat_map(|p| ["--target-path".to_string(), p.clone()])
            .collect()
    }

    fn model_args(&self, subcommand: &str, loaded: LoadedEntities) -> Vec<String> {
        let mut args = vec![subcommand.to_string()];
        args.extend(self.log_level_args());
        args.extend(["--threads".to_string(), self.config.threads.to_string()]);
        args.extend(self.target_args());
        args.extend(["--vars".to_string(), loaded.vars()]);
        args
    }

    /// Steps run after a load, in order
    pub fn plan(&self, loaded: LoadedEntities) -> Vec<TransformStep> {
        let mut steps = Vec::new();

        if self.config.install_deps {
            let mut args = vec!["deps".to_string()];
            args.extend(self.log_level_args());
            steps.push(TransformStep::new("deps", args));
        }

        steps.push(TransformStep::new("run", self.model_args("run", loaded)));

        if self.config.run_tests {
            let mut args = self.model_args("test", loaded);
            if !loaded.is_complete() {
                args.push("--exclude".to_string());
                args.extend(PARTIAL_LOAD_EXCLUDES.iter().map(|s| (*s).to_string()));
            }
            steps.push(TransformStep::new("test", args));
        }

        if self.config.generate_docs {
            let mut args = vec!["docs".to_string(), "generate".to_string()];
            args.extend(self.log_level_args());
            args.extend(self.target_args());
            steps.push(TransformStep {
                soft: true,
                timeout: Some(Duration::from_secs(self.config.docs_timeout_secs)),
                ..TransformStep::new("docs generate", args)
            });
        }

        steps
    }

    /// Run the post-load sequence
    pub async fn run_after_load(&self, loaded: LoadedEntities) -> Result<TransformReport> {
        if !loaded.is_complete() {
            warn!(
                projects = loaded.projects,
                users = loaded.users,
                "Partial load, skipping relationship and source tests"
            );
        }
        self.run_steps(self.plan(loaded)).await
    }

    /// Run one dbt command such as `run` or `docs generate`
    pub async fn run_command(&self, command: &str) -> Result<TransformReport> {
        let mut args: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if args.is_empty() {
            return Err(Error::transform("empty dbt command"));
        }
        args.extend(self.log_level_args());

        let name = command.split_whitespace().collect::<Vec<_>>().join(" ");
        self.run_steps(vec![TransformStep::new(&name, args)]).await
    }

    async fn run_steps(&self, steps: Vec<TransformStep>) -> Result<TransformReport> {
        if !self.config.project_dir.is_dir() {
            return Err(Error::FileNotFound {
                path: self.config.project_dir.display().to_string(),
            });
        }

        let mut report = TransformReport::default();
        for step in steps {
            match self.execute(&step).await {
                Ok(()) => report.completed.push(step.name),
                Err(e) if step.soft => {
                    warn!(step = %step.name, error = %e, "Optional transform step failed, continuing");
                    report.skipped.push(step.name);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "Transforms finished"
        );
        Ok(report)
    }

    async fn execute(&self, step: &TransformStep) -> Result<()> {
        let config = &self.config;
        info!(step = %step.name, "Running {} {}", config.program, step.args.join(" "));

        let mut command = Command::new(&config.program);
        command
            .args(&step.args)
            .current_dir(&config.project_dir)
            .envs(&config.env)
            .env("DBT_LOG_LEVEL", &config.log_level)
            .env("DBT_THREADS", config.threads.to_string())
            .kill_on_drop(true);
        if let Some(path) = &config.target_path {
            command.env("DBT_TARGET_PATH", path);
        }
        if let Some(path) = &config.log_path {
            command.env("DBT_LOG_PATH", path);
        }

        let status = command.status();
        let status = match step.timeout {
            Some(limit) => tokio::time::timeout(limit, status).await.map_err(|_| {
                Error::transform(format!(
                    "'{}' timed out after {}s",
                    step.name,
                    limit.as_secs()
                ))
            })?,
            None => status.await,
        }
        .map_err(|e| Error::transform(format!("failed to start {}: {e}", config.program)))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::TransformFailed {
                step: step.name.clone(),
                code: status.code(),
            })
        }
    }
}
