//! Run records: the persisted history of each execution attempt.
//!
//! A record is written twice by the lifecycle manager: once when the run
//! starts and once when it reaches a terminal status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::workflow::WorkflowId;

/// One execution attempt of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Workflow being executed
    pub workflow_id: WorkflowId,

    /// Current status
    pub status: RunStatus,

    /// Structured outcome payload (final state or error)
    pub logs: Value,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the run reached a terminal status; `None` while pending/running
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a record in `pending` state
    pub fn pending(workflow_id: WorkflowId) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Pending,
            logs: Value::Object(Default::default()),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Create a record in `running` state
    pub fn running(workflow_id: WorkflowId) -> Self {
        Self {
            status: RunStatus::Running,
            ..Self::pending(workflow_id)
        }
    }

    /// Move to a terminal status, stamping `finished_at`
    ///
    /// The completion time never precedes `created_at`, even if the wall
    /// clock stepped backwards in between.
    pub fn finish(&mut self, status: RunStatus, logs: Value) -> Result<(), TransitionError> {
        if !status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;

        self.logs = logs;
        self.finished_at = Some(Utc::now().max(self.created_at));
        Ok(())
    }

    /// Apply a status transition, enforcing monotonic progress
    pub fn transition(&mut self, to: RunStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Check if the run has reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error message recorded for a failed run, if any
    pub fn error_message(&self) -> Option<&str> {
        self.logs.get("error").and_then(Value::as_str)
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created but not yet started
    Pending,

    /// Currently executing
    Running,

    /// Every step continued
    Success,

    /// A step halted or errored, or the run could not start
    Failed,

    /// Reserved; no modeled transition reaches it
    Canceled,
}

impl RunStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Pending,
        RunStatus::Running,
        RunStatus::Success,
        RunStatus::Failed,
        RunStatus::Canceled,
    ];

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Terminal statuses carry a `finished_at`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// Monotonic lifecycle: pending → running → terminal
    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        match (self, to) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Rejected status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid run status transition: {from} → {to}")]
pub struct TransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Status string outside the run status enum
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status '{0}'. Allowed: pending, running, success, failed, canceled")]
pub struct UnknownStatus(pub String);
