//! Routes and handlers.

use algos_core::algorithm::AlgorithmDescriptor;
use algos_core::ledger::{Job, JobFailure, JobId, JobState, Priority};
use algos_core::spec::RawJobRequest;
use algos_core::ErrorKind;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::AppState;

pub const CALLER_HEADER: &str = "x-caller-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const ANONYMOUS: &str = "anonymous";
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 1000;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/algorithms", get(list_algorithms))
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .with_state(state)
}

/// Job as returned over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub algorithm: String,
    pub version: String,
    pub state: JobState,
    pub priority: Priority,
    pub caller: String,
    pub idempotency_key: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<JobFailure>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            algorithm: job.request.algorithm.name,
            version: job.request.algorithm.version,
            state: job.state,
            priority: job.request.priority,
            caller: job.request.caller,
            idempotency_key: job.request.idempotency_key,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: usize,
    pub queued: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        running: state.scheduler.running(),
        queued: state.scheduler.queue_depth().await,
    })
}

async fn list_algorithms(State(state): State<AppState>) -> Json<Vec<AlgorithmDescriptor>> {
    Json(state.scheduler.algorithms())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RawJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(mut raw) = body.map_err(|e| ApiError::new(ErrorKind::Validation, e.body_text()))?;
    if raw.normalized_key().is_none() {
        raw.idempotency_key = header_value(&headers, IDEMPOTENCY_HEADER).map(str::to_string);
    }
    let caller = header_value(&headers, CALLER_HEADER).unwrap_or(ANONYMOUS);

    let submission = state.scheduler.submit(raw, caller).await?;
    let status = if submission.replayed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(submission.job.into())))
}

/// Non-numeric ids get the JSON error body rather than axum's plain-text rejection.
fn job_id(path: Result<Path<JobId>, PathRejection>) -> Result<JobId, ApiError> {
    let Path(id) = path.map_err(|e| ApiError::new(ErrorKind::Validation, e.body_text()))?;
    Ok(id)
}

async fn get_job(
    State(state): State<AppState>,
    path: Result<Path<JobId>, PathRejection>,
) -> Result<Json<JobView>, ApiError> {
    let id = job_id(path)?;
    let job = state.scheduler.status(id).await?;
    Ok(Json(job.into()))
}

async fn cancel_job(
    State(state): State<AppState>,
    path: Result<Path<JobId>, PathRejection>,
) -> Result<Json<JobView>, ApiError> {
    let id = job_id(path)?;
    let job = state.scheduler.cancel(id).await?;
    Ok(Json(job.into()))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = state.scheduler.list(limit).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}
