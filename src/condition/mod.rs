//! Condition language used by the filter step.
//!
//! A small, side-effect free expression grammar over the pipeline state:
//! paths (`http.status_code`, `input_data['http']['json']`), literals,
//! comparisons and boolean connectives. See [`parser`] for the grammar.

pub mod eval;
pub mod lexer;
pub mod parser;

use serde_json::Value;
use thiserror::Error;

use crate::core::PipelineState;
use parser::Expr;

/// Condition parse or evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("{0}")]
    Eval(String),
}

impl ConditionError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// A parsed condition, reusable across evaluations
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    /// Original text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to any JSON value
    pub fn evaluate_value(&self, state: &PipelineState) -> Result<Value, ConditionError> {
        eval::evaluate(&self.expr, state)
    }

    /// Evaluate, requiring a strict boolean result
    pub fn evaluate(&self, state: &PipelineState) -> Result<bool, ConditionError> {
        match self.evaluate_value(state)? {
            Value::Bool(result) => Ok(result),
            other => Err(ConditionError::Eval(format!(
                "condition must evaluate to a boolean, got {}",
                eval::type_name(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_requires_boolean() {
        let mut state = PipelineState::new();
        state.merge("http", json!({"status_code": 200}));

        let condition = Condition::parse("http.status_code").unwrap();
        assert_eq!(condition.evaluate_value(&state).unwrap(), json!(200));
        assert_eq!(
            condition.evaluate(&state).unwrap_err(),
            ConditionError::Eval("condition must evaluate to a boolean, got number".to_string())
        );
    }

    #[test]
    fn test_condition_is_reusable() {
        let condition = Condition::parse("http.status_code == 200").unwrap();
        assert_eq!(condition.source(), "http.status_code == 200");

        for (code, expected) in [(200, true), (404, false), (500, false)] {
            let mut state = PipelineState::new();
            state.merge("http", json!({"status_code": code}));
            assert_eq!(condition.evaluate(&state).unwrap(), expected);
        }
    }

    #[test]
    fn test_error_display() {
        let err = Condition::parse("a ==").unwrap_err();
        assert_eq!(
            err.to_string(),
            "syntax error at position 4: expected a value, found end of input"
        );
    }
}
