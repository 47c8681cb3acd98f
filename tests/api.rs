//! API Integration Tests
//!
//! Tests for the trigger endpoint and run history routes.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use hookflow::api::{self, AppState, QUEUED_MESSAGE, TOTAL_COUNT_HEADER};
use hookflow::domain::{RunRecord, RunStatus, Step, WorkflowDefinition};
use hookflow::store::{MemoryRunStore, MemoryWorkflowStore, RunStore};
use hookflow::worker::{JobDispatcher, JobReceiver};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    app: Router,
    receiver: Option<JobReceiver>,
    runs: Arc<MemoryRunStore>,
}

fn harness() -> Harness {
    let (dispatcher, receiver) = JobDispatcher::channel();
    let runs = Arc::new(MemoryRunStore::new());
    let workflows = MemoryWorkflowStore::from_definitions([WorkflowDefinition::new(1, "gate")
        .with_step(Step::new("filter", json!({"condition": "true"})))]);

    let state = Arc::new(AppState {
        dispatcher,
        runs: runs.clone(),
        workflows: Arc::new(workflows),
    });

    Harness {
        app: api::router(state),
        receiver: Some(receiver),
        runs,
    }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Store `count` finished runs of workflow 1, one minute apart, oldest first
async fn seed_runs(runs: &MemoryRunStore, count: usize) -> Vec<RunRecord> {
    let start = Utc::now() - Duration::hours(1);
    let mut seeded = Vec::new();
    for n in 0..count {
        let mut record = RunRecord::running(1);
        record.created_at = start + Duration::minutes(n as i64);
        runs.create(&record).await.unwrap();

        let status = if n % 2 == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        record.finish(status, json!({"n": n})).unwrap();
        runs.update_status(&record).await.unwrap();
        seeded.push(record);
    }
    seeded
}

#[tokio::test]
async fn test_health() {
    let harness = harness();
    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_trigger_queues_job() {
    let harness = harness();

    let (status, body) = send(&harness.app, "POST", "/workflows/1/trigger").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], QUEUED_MESSAGE);
    assert_eq!(body["workflow_id"], 1);

    let receiver = harness.receiver.unwrap();
    let job = receiver.lock().await.try_recv().unwrap();
    assert_eq!(job.workflow_id, 1);
    assert_eq!(body["job_id"], job.id.to_string());
}

#[tokio::test]
async fn test_trigger_does_not_check_workflow_exists() {
    let harness = harness();

    let (status, body) = send(&harness.app, "POST", "/workflows/404/trigger").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["workflow_id"], 404);
    // Nothing is recorded at trigger time
    assert!(harness.runs.is_empty().await);
}

#[tokio::test]
async fn test_trigger_rejects_bad_id() {
    let harness = harness();

    let (status, body) = send(&harness.app, "POST", "/workflows/abc/trigger").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("abc"));
}

#[tokio::test]
async fn test_trigger_unavailable_without_processors() {
    let mut harness = harness();
    drop(harness.receiver.take());

    let (status, body) = send(&harness.app, "POST", "/workflows/1/trigger").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("closed"));
}

#[tokio::test]
async fn test_list_runs_newest_first_with_paging() {
    let harness = harness();
    let seeded = seed_runs(&harness.runs, 5).await;

    let (status, body) = send(&harness.app, "GET", "/workflows/1/runs").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    let expected: Vec<String> = seeded.iter().rev().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, expected);

    let (_, page) = send(&harness.app, "GET", "/workflows/1/runs?limit=2&offset=1").await;
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["id"], seeded[3].id.to_string());
    assert_eq!(page[1]["id"], seeded[2].id.to_string());

    // Out-of-range limits are clamped
    let (_, clamped) = send(&harness.app, "GET", "/workflows/1/runs?limit=0").await;
    assert_eq!(clamped.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_runs_by_status() {
    let harness = harness();
    seed_runs(&harness.runs, 5).await;

    let (status, body) = send(&harness.app, "GET", "/workflows/1/runs?status=failed").await;
    assert_eq!(status, StatusCode::OK);
    let runs = body.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r["status"] == "failed"));

    let (status, body) = send(&harness.app, "GET", "/workflows/1/runs?status=done").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("Allowed"));

    let (status, _) = send(&harness.app, "GET", "/workflows/1/runs?limit=many").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_list_runs_unknown_workflow() {
    let harness = harness();

    let (status, body) = send(&harness.app, "GET", "/workflows/2/runs").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Workflow not found"}));
}

#[tokio::test]
async fn test_runs_meta_counts() {
    let harness = harness();
    seed_runs(&harness.runs, 5).await;

    let (status, body) = send(&harness.app, "GET", "/workflows/1/runs/meta").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"total": 5}));

    let (_, body) = send(&harness.app, "GET", "/workflows/1/runs/meta?status=success").await;
    assert_eq!(body, json!({"total": 3}));
}

#[tokio::test]
async fn test_head_runs_reports_total_header() {
    let harness = harness();
    seed_runs(&harness.runs, 5).await;

    let head = |uri: &str| {
        Request::builder()
            .method("HEAD")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let response = harness.app.clone().oneshot(head("/workflows/1/runs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[TOTAL_COUNT_HEADER], "5");

    let response = harness
        .app
        .clone()
        .oneshot(head("/workflows/1/runs?status=failed"))
        .await
        .unwrap();
    assert_eq!(response.headers()[TOTAL_COUNT_HEADER], "2");

    let response = harness.app.clone().oneshot(head("/workflows/2/runs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(TOTAL_COUNT_HEADER).is_none());

    let response = harness
        .app
        .clone()
        .oneshot(head("/workflows/1/runs?status=done"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_get_run() {
    let harness = harness();
    let seeded = seed_runs(&harness.runs, 1).await;
    let record = &seeded[0];

    let (status, body) = send(&harness.app, "GET", &format!("/runs/{}", record.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow_id"], 1);
    assert_eq!(body["status"], "success");
    assert_eq!(body["logs"], json!({"n": 0}));
    assert!(body["finished_at"].is_string());

    let (status, _) = send(&harness.app, "GET", &format!("/runs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&harness.app, "GET", "/runs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
