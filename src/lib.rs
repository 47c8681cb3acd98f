//! hookflow - Webhook-triggered workflow engine
//!
//! A trigger enqueues a workflow id and returns at once; background
//! processors later load the definition, run its steps in order and record
//! the outcome as a run record.
//!
//! # Architecture
//!
//! - A workflow is an ordered list of typed steps
//! - Each step type is served by a registered handler
//! - Handlers report Continue / Halt / Error; the first non-Continue ends the run
//! - Every execution attempt leaves exactly one run record
//!
//! # Modules
//!
//! - `api`: HTTP trigger endpoint and run history (axum)
//! - `condition`: Expression language of the filter step
//! - `core`: Orchestration logic (Orchestrator, PipelineState)
//! - `domain`: Data structures (WorkflowDefinition, Step, RunRecord)
//! - `steps`: Step handlers and their registry
//! - `store`: Run and workflow persistence
//! - `worker`: Job dispatch, processor pool and run lifecycle
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the trigger API
//! hookflow serve --bind 127.0.0.1:8000
//!
//! # Trigger a workflow
//! curl -X POST http://127.0.0.1:8000/workflows/7/trigger
//!
//! # Inspect history
//! hookflow runs --workflow 7
//! ```

pub mod api;
pub mod cli;
pub mod condition;
pub mod config;
pub mod core;
pub mod domain;
pub mod steps;
pub mod store;
pub mod worker;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestration, Orchestrator, PipelineState, RunOutcome};
pub use domain::{RunRecord, RunStatus, Step, WorkflowDefinition, WorkflowId};
pub use steps::{HandlerRegistry, Outcome, StepHandler};
pub use store::{JsonlRunStore, MemoryRunStore, RunStore};
pub use worker::{JobDispatcher, RunLifecycle};
