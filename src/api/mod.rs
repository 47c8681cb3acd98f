//! HTTP surface: trigger endpoint and run history.
//!
//! Every error body is `{"detail": ...}`.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path as AxumPath, Query, State},
    http::{header::HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{RunRecord, RunStatus, WorkflowId};
use crate::store::{RunQuery, RunStore, StoreError, WorkflowStore, DEFAULT_LIMIT, MAX_LIMIT};
use crate::worker::{DispatchError, JobDispatcher};

/// Header carrying the run total on `HEAD /workflows/:id/runs`
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Response message for an accepted trigger
pub const QUEUED_MESSAGE: &str = "Workflow execution has been queued.";

/// Shared handler state
pub struct AppState {
    pub dispatcher: JobDispatcher,
    pub runs: Arc<dyn RunStore>,
    pub workflows: Arc<dyn WorkflowStore>,
}

pub type ApiState = Arc<AppState>;

/// Error response carrying a status and a `detail` payload
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Value::String(detail.into()),
        }
    }

    fn internal(context: &str, err: StoreError) -> Self {
        error!(error = %err, "{}", context);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, context)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows/:id/trigger", post(trigger_workflow))
        .route("/workflows/:id/runs", get(list_runs).head(head_runs))
        .route("/workflows/:id/runs/meta", get(runs_meta))
        .route("/runs/:run_id", get(get_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn parse_workflow_id(raw: &str) -> ApiResult<WorkflowId> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid workflow id '{}'", raw)))
}

/// Accept a trigger and queue one execution; body and headers are ignored
async fn trigger_workflow(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let workflow_id = parse_workflow_id(&id)?;

    let job = state.dispatcher.enqueue(workflow_id).map_err(|e| match e {
        DispatchError::Closed => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    })?;

    info!(job_id = %job.id, workflow_id, "Trigger accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": QUEUED_MESSAGE,
            "workflow_id": workflow_id,
            "job_id": job.id,
        })),
    ))
}

/// Query string of the run listing
#[derive(Debug, Default, Deserialize)]
pub struct RunsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

impl RunsParams {
    fn status(&self) -> ApiResult<Option<RunStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: crate::domain::UnknownStatus| {
                    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }),
        }
    }

    fn into_query(self, workflow_id: WorkflowId) -> ApiResult<RunQuery> {
        let status = self.status()?;
        let limit = self
            .limit
            .unwrap_or(DEFAULT_LIMIT as i64)
            .clamp(1, MAX_LIMIT as i64) as usize;
        let offset = self.offset.unwrap_or(0).max(0) as usize;

        Ok(RunQuery::for_workflow(workflow_id)
            .with_status(status)
            .with_limit(limit)
            .with_offset(offset))
    }
}

fn query_params(params: Result<Query<RunsParams>, QueryRejection>) -> ApiResult<RunsParams> {
    params
        .map(|Query(params)| params)
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.body_text()))
}

async fn ensure_workflow(state: &AppState, workflow_id: WorkflowId) -> ApiResult<()> {
    match state.workflows.get(workflow_id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(ApiError::new(StatusCode::NOT_FOUND, "Workflow not found")),
        Err(e) => Err(ApiError::internal("Failed to load workflow", e)),
    }
}

/// Runs of a workflow, newest first
async fn list_runs(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    params: Result<Query<RunsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<RunRecord>>> {
    let workflow_id = parse_workflow_id(&id)?;
    let query = query_params(params)?.into_query(workflow_id)?;
    ensure_workflow(&state, workflow_id).await?;

    let runs = state
        .runs
        .list(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to list runs", e))?;
    Ok(Json(runs))
}

async fn count_runs(
    state: &AppState,
    id: &str,
    params: Result<Query<RunsParams>, QueryRejection>,
) -> ApiResult<usize> {
    let workflow_id = parse_workflow_id(id)?;
    let status = query_params(params)?.status()?;
    ensure_workflow(state, workflow_id).await?;

    state
        .runs
        .count(Some(workflow_id), status)
        .await
        .map_err(|e| ApiError::internal("Failed to count runs", e))
}

/// Total number of runs of a workflow
async fn runs_meta(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    params: Result<Query<RunsParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let total = count_runs(&state, &id, params).await?;
    Ok(Json(json!({ "total": total })))
}

/// Run total as a header, no body
async fn head_runs(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    params: Result<Query<RunsParams>, QueryRejection>,
) -> ApiResult<(StatusCode, [(HeaderName, String); 1])> {
    let total = count_runs(&state, &id, params).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(HeaderName::from_static(TOTAL_COUNT_HEADER), total.to_string())],
    ))
}

async fn get_run(
    State(state): State<ApiState>,
    AxumPath(run_id): AxumPath<String>,
) -> ApiResult<Json<RunRecord>> {
    let id = Uuid::parse_str(&run_id)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid run id '{}'", run_id)))?;

    state
        .runs
        .get(id)
        .await
        .map_err(|e| ApiError::internal("Failed to load run", e))?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Run not found"))
}
