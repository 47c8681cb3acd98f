//! Persistence for run records and read access to workflow definitions.
//!
//! - RunStore: create/update/query run records (memory or JSONL)
//! - WorkflowStore: load definitions by id (memory or a directory of files)

pub mod jsonl;
pub mod runs;
pub mod workflows;

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::TransitionError;

pub use jsonl::JsonlRunStore;
pub use runs::{MemoryRunStore, RunQuery, RunStore, DEFAULT_LIMIT, MAX_LIMIT};
pub use workflows::{DirWorkflowStore, MemoryWorkflowStore, WorkflowStore};

/// Errors that can occur in the stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Run not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Invalid workflow definition {}: {message}", .path.display())]
    InvalidDefinition { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}
