//! Command-line interface for hookflow.
//!
//! `serve` hosts the trigger API; the other commands work directly on the
//! configured run log and workflow directory.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{self, AppState};
use crate::condition::Condition;
use crate::config::{self, ResolvedConfig};
use crate::core::Orchestrator;
use crate::domain::{RunRecord, RunStatus, WorkflowDefinition, WorkflowId};
use crate::steps::{HandlerRegistry, HttpSettings};
use crate::store::{DirWorkflowStore, JsonlRunStore, RunQuery, RunStore, WorkflowStore};
use crate::worker::{self, RunLifecycle};

/// hookflow - Webhook-triggered workflow engine
#[derive(Parser, Debug)]
#[command(name = "hookflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the trigger API and process queued runs
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Number of background processors (overrides config)
        #[arg(short, long)]
        processors: Option<usize>,
    },

    /// Run a workflow in the foreground and print its record
    Run {
        /// Workflow ID
        workflow_id: WorkflowId,
    },

    /// List recent runs
    Runs {
        /// Only runs of this workflow
        #[arg(short, long)]
        workflow: Option<WorkflowId>,

        /// Only runs with this status
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Number of runs to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show a single run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// Validate a workflow definition file without running it
    Check {
        /// Definition file (.yaml, .yml or .json)
        file: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { bind, processors } => serve(bind, processors).await,
            Commands::Run { workflow_id } => run_workflow(workflow_id).await,
            Commands::Runs {
                workflow,
                status,
                limit,
                offset,
            } => list_runs(workflow, status, limit, offset).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Check { file } => check_definition(&file),
            Commands::Config => show_config(),
        }
    }
}

/// Stores and lifecycle wired from configuration
struct Engine {
    runs: Arc<dyn RunStore>,
    workflows: Arc<dyn WorkflowStore>,
    lifecycle: Arc<RunLifecycle>,
}

impl Engine {
    async fn from_config(cfg: &ResolvedConfig) -> Result<Self> {
        let runs: Arc<dyn RunStore> = Arc::new(
            JsonlRunStore::open(&cfg.runs_log)
                .await
                .with_context(|| format!("Failed to open run log: {}", cfg.runs_log.display()))?,
        );
        let workflows: Arc<dyn WorkflowStore> =
            Arc::new(DirWorkflowStore::new(&cfg.workflows_dir));

        let registry = Arc::new(HandlerRegistry::with_builtins(cfg.http_settings()));
        let lifecycle = RunLifecycle::new(workflows.clone(), runs.clone(), Orchestrator::new(registry))
            .with_settings(cfg.lifecycle_settings());

        Ok(Self {
            runs,
            workflows,
            lifecycle: Arc::new(lifecycle),
        })
    }
}

/// Serve the API until Ctrl-C, then drain queued jobs
async fn serve(bind: Option<String>, processors: Option<usize>) -> Result<()> {
    let cfg = config::config()?;

    let addr: SocketAddr = match bind {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid bind address: {}", raw))?,
        None => cfg.bind,
    };
    let processors = processors.unwrap_or(cfg.processors);

    let engine = Engine::from_config(cfg).await?;
    let (dispatcher, pool) = worker::start(processors, engine.lifecycle);

    let state = Arc::new(AppState {
        dispatcher,
        runs: engine.runs,
        workflows: engine.workflows,
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, processors = pool.size(), workflows = %cfg.workflows_dir.display(), "Listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The router (and its dispatcher) is gone; processors finish what is queued
    info!("Draining queued jobs");
    pool.join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Run one workflow synchronously
async fn run_workflow(workflow_id: WorkflowId) -> Result<()> {
    let cfg = config::config()?;
    let engine = Engine::from_config(cfg).await?;

    let Some(record) = engine.lifecycle.execute(workflow_id).await else {
        anyhow::bail!(
            "Workflow {} not found in {}",
            workflow_id,
            cfg.workflows_dir.display()
        );
    };

    println!("{}", serde_json::to_string_pretty(&record)?);

    match record.status {
        RunStatus::Success => eprintln!("\n[Run {} completed successfully]", record.id),
        _ => eprintln!(
            "\n[Run {} {}: {}]",
            record.id,
            record.status,
            record.error_message().unwrap_or("no error recorded")
        ),
    }

    Ok(())
}

/// List recent runs
async fn list_runs(
    workflow: Option<WorkflowId>,
    status: Option<String>,
    limit: usize,
    offset: usize,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<RunStatus>())
        .transpose()?;

    let cfg = config::config()?;
    let store = JsonlRunStore::new(&cfg.runs_log);

    let query = RunQuery {
        workflow_id: workflow,
        ..RunQuery::default()
    }
    .with_status(status)
    .with_limit(limit)
    .with_offset(offset);

    let runs = store.list(&query).await?;
    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<10} {:<25}",
        "RUN ID", "WORKFLOW", "STATUS", "CREATED"
    );
    println!("{}", "-".repeat(85));

    for run in &runs {
        println!(
            "{:<38} {:<10} {:<10} {:<25}",
            run.id,
            run.workflow_id,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let total = store.count(workflow, status).await?;
    println!("\nShowing {} of {} run(s)", runs.len(), total);
    Ok(())
}

/// Show a single run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let cfg = config::config()?;
    let store = JsonlRunStore::new(&cfg.runs_log);
    let run = store
        .get(run_id)
        .await?
        .with_context(|| format!("Run not found: {}", run_id))?;

    print_run(&run)
}

fn print_run(run: &RunRecord) -> Result<()> {
    println!("Run ID: {}", run.id);
    println!("Workflow: {}", run.workflow_id);
    println!("Status: {}", run.status);
    println!("Created: {}", run.created_at);
    if let Some(finished) = run.finished_at {
        println!("Finished: {}", finished);
    }
    if let Some(error) = run.error_message() {
        println!("Error: {}", error);
    }
    println!("\nLogs:");
    println!("{}", serde_json::to_string_pretty(&run.logs)?);
    Ok(())
}

/// Collect problems a definition would hit at run time
pub fn lint_definition(definition: &WorkflowDefinition, registry: &HandlerRegistry) -> Vec<String> {
    let mut problems = Vec::new();

    for (offset, step) in definition.steps.iter().enumerate() {
        let index = offset + 1;

        let (tag, config) = match step.checked() {
            Ok(parts) => parts,
            Err(problem) => {
                problems.push(format!("Step {} ({}): {}", index, step.type_label(), problem));
                continue;
            }
        };

        let handler = match registry.resolve(tag) {
            Ok(handler) => handler,
            Err(e) => {
                problems.push(format!("Step {} ({}): {}", index, tag, e));
                continue;
            }
        };

        match handler.name() {
            "filter" => match config.get("condition").and_then(|c| c.as_str()) {
                Some(source) if !source.trim().is_empty() => {
                    if let Err(e) = Condition::parse(source) {
                        problems.push(format!("Step {} ({}): {}", index, tag, e));
                    }
                }
                _ => problems.push(format!("Step {} ({}): missing 'condition'", index, tag)),
            },
            "http" => {
                let has_url = config
                    .get("url")
                    .and_then(|u| u.as_str())
                    .map_or(false, |u| !u.trim().is_empty());
                if !has_url {
                    problems.push(format!("Step {} ({}): missing 'url'", index, tag));
                }
            }
            _ => {}
        }
    }

    problems
}

/// Validate a definition file
fn check_definition(path: &Path) -> Result<()> {
    let definition = WorkflowDefinition::from_file(path)?;
    let registry = HandlerRegistry::with_builtins(HttpSettings::default());

    let problems = lint_definition(&definition, &registry);
    if problems.is_empty() {
        println!(
            "✓ {} ({} step(s)) looks good",
            path.display(),
            definition.steps.len()
        );
        return Ok(());
    }

    for problem in &problems {
        println!("✗ {}", problem);
    }
    anyhow::bail!("{} problem(s) found in {}", problems.len(), path.display())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("hookflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Workflows:  {}", cfg.workflows_dir.display());
    println!("  Run log:    {}", cfg.runs_log.display());
    println!();
    println!("Server:");
    println!("  Bind:       {}", cfg.bind);
    println!("  Processors: {}", cfg.processors);
    println!(
        "  Record unknown workflows: {}",
        cfg.record_unknown_workflows
    );
    println!();
    println!("HTTP steps:");
    println!("  Timeout:    {:?}", cfg.http_timeout);
    Ok(())
}
