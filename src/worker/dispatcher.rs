//! Job dispatch: the boundary between a trigger and its execution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::domain::WorkflowId;

/// A scheduled execution of one workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub workflow_id: WorkflowId,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            enqueued_at: Utc::now(),
        }
    }
}

/// Errors that can occur while dispatching
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Job dispatcher is closed: no processor is running")]
    Closed,
}

/// Receiving end shared by every processor
pub type JobReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

/// Accepts workflow ids and hands them to background processors
///
/// Cloning is cheap; all clones feed the same queue.
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    sender: mpsc::UnboundedSender<Job>,
}

impl JobDispatcher {
    /// Create a dispatcher and the receiver processors consume from
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, Arc::new(Mutex::new(receiver)))
    }

    /// Schedule a workflow for execution without waiting for it
    pub fn enqueue(&self, workflow_id: WorkflowId) -> Result<Job, DispatchError> {
        let job = Job::new(workflow_id);
        self.sender
            .send(job.clone())
            .map_err(|_| DispatchError::Closed)?;

        info!(job_id = %job.id, workflow_id, "Job enqueued");
        Ok(job)
    }

    /// Check whether every receiver is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
