//! Condition Integration Tests
//!
//! Tests for gate expressions evaluated against realistic pipeline state.

use hookflow::condition::{Condition, ConditionError};
use hookflow::domain::StepConfig;
use hookflow::steps::{ErrorKind, FilterStep, Outcome, StepHandler};
use hookflow::PipelineState;
use serde_json::{json, Value};

fn webhook_state() -> PipelineState {
    let mut state = PipelineState::new();
    state.merge(
        "http",
        json!({
            "status_code": 200,
            "headers": {"content-type": "application/json"},
            "json": {
                "order": {"id": "A-17", "total": 129.5, "items": [{"sku": "x1"}, {"sku": "x2"}]},
                "tags": ["priority", "eu"],
                "coupon": null
            }
        }),
    );
    state
}

fn check(source: &str) -> bool {
    Condition::parse(source)
        .unwrap_or_else(|e| panic!("{}: {}", source, e))
        .evaluate(&webhook_state())
        .unwrap_or_else(|e| panic!("{}: {}", source, e))
}

#[test]
fn test_gate_expressions() {
    let cases = [
        ("input_data['http']['status_code'] == 200", true),
        ("http.status_code >= 200 and http.status_code < 300", true),
        ("http.status_code != 200", false),
        ("http.json.order.total > 100", true),
        ("http.json.order.total > 100.0 and http.json.order.id == 'A-17'", true),
        ("http.json.order.items[1].sku == \"x2\"", true),
        ("http.json.tags[0] == 'priority' or false", true),
        ("not (http.json.coupon == None)", false),
        ("http.json.coupon == null", true),
        ("http.headers['content-type'] == 'application/json'", true),
        ("True and not False", true),
        ("(1 < 2) and -http.json.order.total < 0", true),
    ];

    for (source, expected) in cases {
        assert_eq!(check(source), expected, "{}", source);
    }
}

#[test]
fn test_short_circuit_skips_missing_paths() {
    assert!(!check("http.status_code == 500 and http.json.missing.deeper == 1"));
    assert!(check("http.status_code == 200 or http.json.missing.deeper == 1"));
}

#[test]
fn test_missing_path_is_an_error() {
    let condition = Condition::parse("http.json.order.discount > 0").unwrap();
    let err = condition.evaluate(&webhook_state()).unwrap_err();
    assert!(matches!(err, ConditionError::Eval(_)));
    assert!(err.to_string().contains("discount"), "{}", err);
}

#[test]
fn test_keyword_named_fields() {
    let mut state = PipelineState::new();
    state.merge("x", json!({"null": 1, "and": true, "not": false, "True": 2}));

    let condition = Condition::parse("x.null == 1 and x.and and not x.not and x.True == 2").unwrap();
    assert!(condition.evaluate(&state).unwrap());
}

#[test]
fn test_syntax_errors_carry_position() {
    let err = Condition::parse("http.status_code == ").unwrap_err();
    assert!(matches!(err, ConditionError::Syntax { .. }));
    assert!(err.to_string().starts_with("syntax error at position"));

    assert!(Condition::parse("1 < 2 < 3").is_err());
    assert!(Condition::parse("__import__('os')").is_err());
}

#[tokio::test]
async fn test_filter_step_outcomes() {
    let state = webhook_state();
    let filter = FilterStep;

    let config = |condition: Value| -> StepConfig {
        serde_json::from_value(json!({ "condition": condition })).unwrap()
    };

    assert_eq!(
        filter.execute(&config(json!("http.status_code == 200")), &state).await,
        Outcome::Continue(json!({"passed": true}))
    );
    assert!(matches!(
        filter.execute(&config(json!("http.status_code == 404")), &state).await,
        Outcome::Halt(_)
    ));
    assert!(matches!(
        filter.execute(&config(json!("http.status_code")), &state).await,
        Outcome::Error { kind: ErrorKind::Evaluation, .. }
    ));
    assert!(matches!(
        filter.execute(&config(json!("  ")), &state).await,
        Outcome::Error { kind: ErrorKind::Config, .. }
    ));
}
