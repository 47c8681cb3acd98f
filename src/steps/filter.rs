//! Conditional gate step ("filter")

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Outcome, StepHandler};
use crate::condition::Condition;
use crate::core::PipelineState;
use crate::domain::StepConfig;

/// Halt reason reported when the condition is false
pub const HALT_REASON: &str = "condition evaluated to false";

/// Lets the pipeline continue only when `condition` holds
#[derive(Debug, Default)]
pub struct FilterStep;

impl FilterStep {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse the `condition` key
    fn condition(config: &StepConfig) -> Result<Condition, Outcome> {
        let source = match config.get("condition") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(Outcome::config_error(
                    "'condition' is required for the filter step",
                ))
            }
            Some(_) => return Err(Outcome::config_error("'condition' must be a string")),
        };

        Condition::parse(source)
            .map_err(|e| Outcome::evaluation_error(format!("invalid condition '{}': {}", source, e)))
    }
}

#[async_trait]
impl StepHandler for FilterStep {
    fn name(&self) -> &str {
        "filter"
    }

    async fn execute(&self, config: &StepConfig, state: &PipelineState) -> Outcome {
        let condition = match Self::condition(config) {
            Ok(condition) => condition,
            Err(outcome) => return outcome,
        };

        match condition.evaluate(state) {
            Ok(true) => {
                debug!(condition = %condition.source(), "Condition passed");
                Outcome::Continue(json!({"passed": true}))
            }
            Ok(false) => {
                info!(condition = %condition.source(), "Condition failed, halting");
                Outcome::Halt(HALT_REASON.to_string())
            }
            Err(e) => Outcome::evaluation_error(format!(
                "failed to evaluate condition '{}': {}",
                condition.source(),
                e
            )),
        }
    }
}
