//! Run lifecycle: load, record, orchestrate, record again.
//!
//! This is the unit of work a processor executes for each job. It never
//! returns an error; every problem ends up in a run record or a log line.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use super::dispatcher::Job;
use crate::core::{Orchestrator, RunOutcome};
use crate::domain::{RunRecord, RunStatus, WorkflowId};
use crate::store::{RunStore, WorkflowStore};

/// Lifecycle options
#[derive(Debug, Clone, Default)]
pub struct LifecycleSettings {
    /// Persist a failed record when a job names a workflow that does not exist
    pub record_unknown_workflows: bool,
}

/// Executes one job end to end
pub struct RunLifecycle {
    workflows: Arc<dyn WorkflowStore>,
    runs: Arc<dyn RunStore>,
    orchestrator: Orchestrator,
    settings: LifecycleSettings,
}

impl RunLifecycle {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runs: Arc<dyn RunStore>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            workflows,
            runs,
            orchestrator,
            settings: LifecycleSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        &self.runs
    }

    pub fn workflows(&self) -> &Arc<dyn WorkflowStore> {
        &self.workflows
    }

    /// Process a dispatched job
    #[instrument(skip(self, job), fields(job_id = %job.id, workflow_id = job.workflow_id))]
    pub async fn process(&self, job: &Job) -> Option<RunRecord> {
        self.execute(job.workflow_id).await
    }

    /// Run a workflow and persist its record
    ///
    /// Returns the final record, or `None` when no record was written.
    pub async fn execute(&self, workflow_id: WorkflowId) -> Option<RunRecord> {
        let definition = match self.workflows.get(workflow_id).await {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                warn!(workflow_id, "Workflow not found, skipping run");
                if !self.settings.record_unknown_workflows {
                    return None;
                }
                return self
                    .record_failure(
                        workflow_id,
                        json!({"error": format!("workflow {} not found", workflow_id)}),
                    )
                    .await;
            }
            Err(e) => {
                error!(workflow_id, error = %e, "Failed to load workflow");
                return self
                    .record_failure(
                        workflow_id,
                        json!({"error": format!("failed to load workflow {}: {}", workflow_id, e)}),
                    )
                    .await;
            }
        };

        let mut record = RunRecord::running(workflow_id);
        if let Err(e) = self.runs.create(&record).await {
            error!(workflow_id, error = %e, "Failed to create run record");
            return None;
        }
        info!(run_id = %record.id, workflow_id, name = %definition.name, "Run started");

        let result = self.orchestrator.run(&definition).await;
        let (status, logs) = match &result.outcome {
            RunOutcome::Success => (
                RunStatus::Success,
                json!({"final_state": result.state}),
            ),
            RunOutcome::Failure(failure) => (
                RunStatus::Failed,
                json!({
                    "error": failure.to_string(),
                    "step": {"index": failure.step_index, "type": failure.step_type},
                    "kind": failure.cause.kind(),
                    "partial_state": result.state,
                }),
            ),
        };

        self.complete(&mut record, status, logs).await;
        Some(record)
    }

    /// Persist a record that failed before orchestration started
    async fn record_failure(&self, workflow_id: WorkflowId, logs: Value) -> Option<RunRecord> {
        let mut record = RunRecord::running(workflow_id);
        if let Err(e) = self.runs.create(&record).await {
            error!(workflow_id, error = %e, "Failed to create run record");
            return None;
        }

        self.complete(&mut record, RunStatus::Failed, logs).await;
        Some(record)
    }

    /// Second write: terminal status, logs and `finished_at`
    async fn complete(&self, record: &mut RunRecord, status: RunStatus, logs: Value) {
        if let Err(e) = record.finish(status, logs) {
            error!(run_id = %record.id, error = %e, "Run record rejected terminal status");
            return;
        }

        match self.runs.update_status(record).await {
            Ok(()) => info!(
                run_id = %record.id,
                workflow_id = record.workflow_id,
                status = %record.status,
                "Run finished"
            ),
            Err(e) => error!(run_id = %record.id, error = %e, "Failed to persist run result"),
        }
    }
}
