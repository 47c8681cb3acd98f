//! Main orchestrator for workflow execution.
//!
//! Walks the steps of a definition in order, resolves each one through the
//! handler registry and threads the accumulated state through them. The
//! first step that does not continue ends the pass.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use crate::domain::WorkflowDefinition;
use crate::steps::{ErrorKind, HandlerRegistry, Outcome, RegistryError};

use super::state::PipelineState;

/// Main workflow orchestrator
#[derive(Debug, Clone)]
pub struct Orchestrator {
    /// Step type → handler factory
    registry: Arc<HandlerRegistry>,
}

/// Result of one orchestration pass
#[derive(Debug, Clone, PartialEq)]
pub struct Orchestration {
    /// State accumulated up to the last continuing step
    pub state: PipelineState,
    pub outcome: RunOutcome,
}

impl Orchestration {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success)
    }
}

/// Overall verdict of a pass
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success,
    Failure(StepFailure),
}

/// The step that stopped a pass and why
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    /// 1-based position of the step in the definition
    pub step_index: usize,

    /// Type tag as written, or `<missing>` when absent
    pub step_type: String,

    pub cause: FailureCause,
}

/// Why a step stopped the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// Gate stopped the pipeline on purpose
    Halted(String),
    Config(String),
    Transport(String),
    Evaluation(String),
    UnknownStepType(String),
}

impl FailureCause {
    /// Stable label persisted in run logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Halted(_) => "halt",
            Self::Config(_) => ErrorKind::Config.as_str(),
            Self::Transport(_) => ErrorKind::Transport.as_str(),
            Self::Evaluation(_) => ErrorKind::Evaluation.as_str(),
            Self::UnknownStepType(_) => "unknown_step_type",
        }
    }

    /// Underlying message without the step prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Halted(m)
            | Self::Config(m)
            | Self::Transport(m)
            | Self::Evaluation(m)
            | Self::UnknownStepType(m) => m,
        }
    }

    fn from_error(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Config => Self::Config(message),
            ErrorKind::Transport => Self::Transport(message),
            ErrorKind::Evaluation => Self::Evaluation(message),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted(reason) => write!(f, "halted: {}", reason),
            Self::Config(m) => write!(f, "configuration error: {}", m),
            Self::Transport(m) => write!(f, "transport error: {}", m),
            Self::Evaluation(m) => write!(f, "evaluation error: {}", m),
            Self::UnknownStepType(m) => write!(f, "failed: {}", m),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {} ({}) {}", self.step_index, self.step_type, self.cause)
    }
}

/// Placeholder type name for steps without a usable tag
impl Orchestrator {
    /// Create an orchestrator over a populated registry
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute every step of a definition in order
    #[instrument(skip(self, definition), fields(workflow_id = definition.id, steps = definition.steps.len()))]
    pub async fn run(&self, definition: &WorkflowDefinition) -> Orchestration {
        let mut state = PipelineState::new();

        for (offset, step) in definition.steps.iter().enumerate() {
            let step_index = offset + 1;

            let (tag, config) = match step.checked() {
                Ok(parts) => parts,
                Err(problem) => {
                    let failure = StepFailure {
                        step_index,
                        step_type: step.type_label(),
                        cause: FailureCause::Config(problem),
                    };
                    error!(step = step_index, "step.failed: {}", failure);
                    return Orchestration {
                        state,
                        outcome: RunOutcome::Failure(failure),
                    };
                }
            };

            let handler = match self.registry.resolve(tag) {
                Ok(handler) => handler,
                Err(RegistryError::UnknownStepType(_)) => {
                    let failure = StepFailure {
                        step_index,
                        step_type: tag.to_string(),
                        cause: FailureCause::UnknownStepType(format!(
                            "unknown step type '{}'",
                            tag
                        )),
                    };
                    error!(step = step_index, step_type = %tag, "step.failed: {}", failure);
                    return Orchestration {
                        state,
                        outcome: RunOutcome::Failure(failure),
                    };
                }
            };

            info!(step = step_index, step_type = %tag, "step.start");
            let started = Instant::now();

            let cause = match handler.execute(config, &state).await {
                Outcome::Continue(output) => {
                    state.merge(tag, output);
                    info!(
                        step = step_index,
                        step_type = %tag,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "step.complete"
                    );
                    continue;
                }
                Outcome::Halt(reason) => {
                    warn!(step = step_index, step_type = %tag, %reason, "step.halted");
                    FailureCause::Halted(reason)
                }
                Outcome::Error { kind, message } => {
                    error!(
                        step = step_index,
                        step_type = %tag,
                        kind = kind.as_str(),
                        error = %message,
                        "step.failed"
                    );
                    FailureCause::from_error(kind, message)
                }
            };

            return Orchestration {
                state,
                outcome: RunOutcome::Failure(StepFailure {
                    step_index,
                    step_type: tag.to_string(),
                    cause,
                }),
            };
        }

        info!(steps = definition.steps.len(), "Workflow completed");
        Orchestration {
            state,
            outcome: RunOutcome::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineState;
    use crate::domain::{Step, StepConfig};
    use crate::steps::{FilterStep, StepHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns its own config as output and counts invocations
    struct ConstStep {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StepHandler for ConstStep {
        fn name(&self) -> &str {
            "const"
        }

        async fn execute(&self, config: &StepConfig, _state: &PipelineState) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Outcome::Continue(json!(config))
        }
    }

    fn orchestrator(calls: Arc<AtomicUsize>) -> Orchestrator {
        let mut registry = HandlerRegistry::new();
        registry.register("const", move || {
            Box::new(ConstStep {
                calls: calls.clone(),
            })
        });
        registry.register("filter", || Box::new(FilterStep::new()));
        Orchestrator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_all_steps_continue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let definition = WorkflowDefinition::new(1, "ok")
            .with_step(Step::new("const", json!({"status_code": 200})))
            .with_step(Step::new("filter", json!({"condition": "const.status_code == 200"})));

        let result = orchestrator(calls.clone()).run(&definition).await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.state.len(), 2);
        assert_eq!(result.state.get("filter").unwrap(), &json!({"passed": true}));
    }

    #[tokio::test]
    async fn test_halt_stops_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let definition = WorkflowDefinition::new(1, "halts")
            .with_step(Step::new("const", json!({"status_code": 404})))
            .with_step(Step::new("filter", json!({"condition": "const.status_code == 200"})))
            .with_step(Step::new("const", json!({"never": true})));

        let result = orchestrator(calls.clone()).run(&definition).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let RunOutcome::Failure(failure) = &result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.step_index, 2);
        assert_eq!(failure.step_type, "filter");
        assert_eq!(failure.cause.kind(), "halt");
        assert_eq!(
            failure.to_string(),
            "Step 2 (filter) halted: condition evaluated to false"
        );
        // Earlier output is kept for diagnostics
        assert_eq!(result.state.get("const").unwrap()["status_code"], 404);
    }

    #[tokio::test]
    async fn test_unknown_step_type() {
        let calls = Arc::new(AtomicUsize::new(0));
        let definition = WorkflowDefinition::new(1, "unknown")
            .with_step(Step::new("const", json!({})))
            .with_step(Step::new("sendmail", json!({})));

        let result = orchestrator(calls).run(&definition).await;

        let RunOutcome::Failure(failure) = result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.step_index, 2);
        assert_eq!(failure.cause.kind(), "unknown_step_type");
        assert_eq!(
            failure.to_string(),
            "Step 2 (sendmail) failed: unknown step type 'sendmail'"
        );
    }

    #[tokio::test]
    async fn test_padded_tag_is_not_normalized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let definition = WorkflowDefinition::new(1, "padded")
            .with_step(Step::new("const", json!({})))
            .with_step(Step::new(" const ", json!({})));

        let result = orchestrator(calls.clone()).run(&definition).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let RunOutcome::Failure(failure) = result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.step_index, 2);
        assert_eq!(failure.step_type, " const ");
        assert_eq!(failure.cause.kind(), "unknown_step_type");
    }

    #[tokio::test]
    async fn test_missing_type_is_config_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut definition = WorkflowDefinition::new(1, "missing");
        definition.steps.push(Step::default());

        let result = orchestrator(calls.clone()).run(&definition).await;

        let RunOutcome::Failure(failure) = result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.step_index, 1);
        assert_eq!(failure.step_type, "<missing>");
        assert_eq!(failure.cause.kind(), "config_error");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_step_fails_in_place() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bad_type = WorkflowDefinition::new(1, "bad type")
            .with_step(Step::new("const", json!({"n": 1})))
            .with_step(Step {
                step_type: Some(json!(5)),
                ..Step::default()
            })
            .with_step(Step::new("const", json!({"n": 3})));

        let result = orchestrator(calls.clone()).run(&bad_type).await;

        let RunOutcome::Failure(failure) = result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.step_index, 2);
        assert_eq!(failure.step_type, "5");
        assert_eq!(failure.cause.kind(), "config_error");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.state.get("const"), Some(&json!({"n": 1})));

        let null_config = WorkflowDefinition::new(2, "null config")
            .with_step(Step::new("const", serde_json::Value::Null));
        let result = orchestrator(calls.clone()).run(&null_config).await;

        let RunOutcome::Failure(failure) = result.outcome else {
            panic!("expected failure");
        };
        assert_eq!(
            failure.to_string(),
            "Step 1 (const) configuration error: 'config' must be a mapping, got null"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_workflow_succeeds() {
        let result = orchestrator(Arc::new(AtomicUsize::new(0)))
            .run(&WorkflowDefinition::new(1, "empty"))
            .await;

        assert!(result.is_success());
        assert!(result.state.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_tag_replaces_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let definition = WorkflowDefinition::new(1, "repeat")
            .with_step(Step::new("const", json!({"n": 1})))
            .with_step(Step::new("const", json!({"n": 2})));

        let result = orchestrator(calls.clone()).run(&definition).await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.state.len(), 1);
        assert_eq!(result.state.get("const").unwrap()["n"], 2);
    }
}
