//! Workflow definitions.
//!
//! A workflow is an ordered list of typed steps. Definitions are authored
//! elsewhere and are read-only here; the engine loads one fresh copy per run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a stored workflow definition
pub type WorkflowId = u64;

/// Opaque per-step configuration, handed verbatim to the step handler
pub type StepConfig = Map<String, Value>;

/// A stored workflow definition
///
/// Graph data that richer editors attach (`edges`, positions, ...) is
/// ignored: only `steps` is consumed, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier (filled from the store key when omitted)
    #[serde(default)]
    pub id: WorkflowId,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Owner reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,

    /// Ordered list of steps to execute
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    /// Create an empty definition
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            owner_id: None,
            steps: Vec::new(),
        }
    }

    /// Append a step (builder style)
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Load a definition from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse a definition from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow YAML")
    }

    /// Parse a definition from JSON content
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse workflow JSON")
    }
}

/// A single step in a workflow
///
/// Both fields are kept as authored so that a malformed step fails at its
/// own position in the run instead of failing the whole definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step type tag; selects the handler. Checked by the orchestrator, not here.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<Value>,

    /// Handler-specific configuration, expected to be a mapping
    #[serde(default = "empty_config")]
    pub config: Value,
}

fn empty_config() -> Value {
    Value::Object(Map::new())
}

impl Default for Step {
    fn default() -> Self {
        Self {
            step_type: None,
            config: empty_config(),
        }
    }
}

/// Placeholder used in diagnostics for a step without a type
pub const MISSING_TYPE: &str = "<missing>";

impl Step {
    /// Create a step with the given type and configuration
    pub fn new(step_type: impl Into<String>, config: Value) -> Self {
        Self {
            step_type: Some(Value::String(step_type.into())),
            config,
        }
    }

    /// The type tag exactly as written, if it is a non-blank string
    ///
    /// Tags are not trimmed: `" http "` is a different (unregistered) tag.
    pub fn type_tag(&self) -> Option<&str> {
        self.step_type
            .as_ref()
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
    }

    /// The type as it should appear in logs and failure messages
    pub fn type_label(&self) -> String {
        match &self.step_type {
            None => MISSING_TYPE.to_string(),
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// The configuration mapping, if the config is one
    pub fn config_map(&self) -> Option<&StepConfig> {
        self.config.as_object()
    }

    /// Type tag and configuration, or the reason the step cannot run
    pub fn checked(&self) -> std::result::Result<(&str, &StepConfig), String> {
        let tag = match &self.step_type {
            None | Some(Value::Null) => return Err("step has no type".to_string()),
            Some(Value::String(_)) => self
                .type_tag()
                .ok_or_else(|| "step type is empty".to_string())?,
            Some(other) => {
                return Err(format!(
                    "step type must be a string, got {}",
                    kind_of(other)
                ))
            }
        };

        let config = self.config_map().ok_or_else(|| {
            format!("'config' must be a mapping, got {}", kind_of(&self.config))
        })?;

        Ok((tag, config))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
