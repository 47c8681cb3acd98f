//! Core orchestration logic.
//!
//! This module contains:
//! - PipelineState: Per-run accumulation of step outputs
//! - Orchestrator: Main execution engine

pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use orchestrator::{FailureCause, Orchestration, Orchestrator, RunOutcome, StepFailure};
pub use state::PipelineState;
