//! Pipeline state: per-step outputs accumulated during one run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outputs of completed steps, keyed by step type tag
///
/// Scoped to a single orchestration pass. Handlers only ever see it
/// through a shared reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState(Map<String, Value>);

impl PipelineState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Output recorded under a step type tag
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.0.get(tag)
    }

    /// Record a step's output; a later step with the same tag replaces it
    pub fn merge(&mut self, tag: impl Into<String>, output: Value) {
        self.0.insert(tag.into(), output);
    }

    /// Check whether a tag has an output
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains_key(tag)
    }

    /// Number of recorded outputs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether no step has produced output yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for PipelineState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
