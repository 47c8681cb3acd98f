//! Step handlers: the pluggable units that execute one step type.
//!
//! Every handler implements [`StepHandler`] and reports a tagged
//! [`Outcome`] instead of failing through errors, so the orchestrator can
//! tell an intentional stop from a fault.

pub mod filter;
pub mod http;
pub mod masking;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PipelineState;
use crate::domain::StepConfig;

pub use filter::FilterStep;
pub use http::{HttpSettings, HttpStep};
pub use registry::{HandlerFactory, HandlerRegistry, RegistryError};

/// Result of executing one step
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Step succeeded; output is merged into the pipeline state
    Continue(Value),

    /// Step deliberately stopped the pipeline (not a defect)
    Halt(String),

    /// Step failed
    Error { kind: ErrorKind, message: String },
}

impl Outcome {
    /// Shorthand for a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ErrorKind::Config,
            message: message.into(),
        }
    }

    /// Shorthand for a transport error
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Shorthand for an evaluation error
    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ErrorKind::Evaluation,
            message: message.into(),
        }
    }

    /// Check if the pipeline may proceed
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// Classes of step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing or malformed step configuration
    #[serde(rename = "config_error")]
    Config,

    /// Network-level fault during an outbound call
    #[serde(rename = "transport_error")]
    Transport,

    /// Gate expression could not be parsed or evaluated to a boolean
    #[serde(rename = "evaluation_error")]
    Evaluation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::Transport => "transport_error",
            Self::Evaluation => "evaluation_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "configuration error",
            Self::Transport => "transport error",
            Self::Evaluation => "evaluation error",
        };
        f.write_str(label)
    }
}

/// Contract every step type implements
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Type tag this handler was built for
    fn name(&self) -> &str;

    /// Execute the step against the state accumulated so far
    async fn execute(&self, config: &StepConfig, state: &PipelineState) -> Outcome;
}

/// Read the first present config value among aliases
pub(crate) fn config_value<'a>(config: &'a StepConfig, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| config.get(*key))
        .filter(|v| !v.is_null())
}
