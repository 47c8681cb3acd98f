//! Interpreter for parsed condition expressions
//!
//! Evaluation reads the pipeline state and nothing else; it cannot call
//! functions, touch the environment or mutate anything.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::parser::{CompareOp, Expr, Path, Segment};
use super::ConditionError;
use crate::core::PipelineState;

/// Root name that refers to the whole pipeline state
pub const STATE_ALIAS: &str = "input_data";

/// Evaluate an expression to a JSON value
pub fn evaluate(expr: &Expr, state: &PipelineState) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => resolve(path, state),
        Expr::Not(inner) => {
            let value = evaluate(inner, state)?;
            Ok(Value::Bool(!expect_bool(&value, "'!'")?))
        }
        Expr::Neg(inner) => negate(&evaluate(inner, state)?),
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, state)?;
            let right = evaluate(right, state)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
        Expr::And(left, right) => {
            if !expect_bool(&evaluate(left, state)?, "'&&'")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(&evaluate(right, state)?, "'&&'")?))
        }
        Expr::Or(left, right) => {
            if expect_bool(&evaluate(left, state)?, "'||'")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(&evaluate(right, state)?, "'||'")?))
        }
    }
}

fn resolve(path: &Path, state: &PipelineState) -> Result<Value, ConditionError> {
    let whole;
    let mut current = match state.get(&path.root) {
        Some(value) => value,
        None if path.root == STATE_ALIAS => {
            whole = Value::Object(state.as_map().clone());
            &whole
        }
        None => {
            return Err(ConditionError::Eval(format!(
                "'{}' is not in the pipeline state",
                path.root
            )))
        }
    };

    for (depth, segment) in path.segments.iter().enumerate() {
        let walked = || Path {
            root: path.root.clone(),
            segments: path.segments[..depth].to_vec(),
        };

        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key).ok_or_else(|| {
                ConditionError::Eval(format!("key '{}' not found in {}", key, walked()))
            })?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index).ok_or_else(|| {
                ConditionError::Eval(format!(
                    "index {} out of range for {} (length {})",
                    index,
                    walked(),
                    items.len()
                ))
            })?,
            (Segment::Key(key), other) => {
                return Err(ConditionError::Eval(format!(
                    "cannot read key '{}' from {} ({})",
                    key,
                    walked(),
                    type_name(other)
                )))
            }
            (Segment::Index(index), other) => {
                return Err(ConditionError::Eval(format!(
                    "cannot index {} ({}) with {}",
                    walked(),
                    type_name(other),
                    index
                )))
            }
        };
    }

    Ok(current.clone())
}

fn expect_bool(value: &Value, operator: &str) -> Result<bool, ConditionError> {
    value.as_bool().ok_or_else(|| {
        ConditionError::Eval(format!(
            "{} expects boolean operands, got {}",
            operator,
            type_name(value)
        ))
    })
}

fn negate(value: &Value) -> Result<Value, ConditionError> {
    let Value::Number(n) = value else {
        return Err(ConditionError::Eval(format!(
            "'-' expects a number, got {}",
            type_name(value)
        )));
    };

    if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
        return Ok(Value::Number(Number::from(i)));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or_else(|| ConditionError::Eval(format!("cannot negate {}", n)))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(ConditionError::Eval(format!(
                        "cannot compare {} with {} using '{}'",
                        type_name(left),
                        type_name(right),
                        op.symbol()
                    )))
                }
            };

            let ordering = ordering.ok_or_else(|| {
                ConditionError::Eval(format!("cannot order {} and {}", left, right))
            })?;

            Ok(holds(op, ordering))
        }
    }
}

fn holds(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

/// Structural equality where numbers compare by value (`200 == 200.0`)
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Some(Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// JSON type name for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
