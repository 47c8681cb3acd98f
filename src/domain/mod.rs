//! Domain types for the workflow engine.
//!
//! This module contains the core data structures:
//! - Workflow: stored definitions and their ordered steps
//! - Run: execution records and their status lifecycle

pub mod run;
pub mod workflow;

pub use run::{RunRecord, RunStatus, TransitionError, UnknownStatus};
pub use workflow::{Step, StepConfig, WorkflowDefinition, WorkflowId};
