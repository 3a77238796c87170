use std::sync::Arc;
use std::time::{Duration, Instant};

use algos_core::algorithm::{Algorithm, AlgorithmDescriptor, AlgorithmRegistry, InputSchema};
use algos_core::control::ExecutionContext;
use algos_core::ledger::{JobLedger, JobState, MemoryLedger};
use algos_core::{ErrorKind, Scheduler, SchedulerLimits};
use algos_rest::api::JobView;
use algos_rest::error::ErrorBody;
use algos_rest::{router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Runs for `input` milliseconds, checking for cancellation.
struct Sleep;

impl Algorithm for Sleep {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("sleep", "1", InputSchema::Integer)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let until = Instant::now() + Duration::from_millis(input.as_u64().unwrap_or(0));
        while Instant::now() < until {
            ctx.checkpoint()?;
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(json!("slept"))
    }
}

fn app_with(slots: usize, max_queue_depth: usize) -> Router {
    let ledger: Arc<dyn JobLedger> = Arc::new(MemoryLedger::new());
    let mut registry = AlgorithmRegistry::with_builtins();
    registry.register(Arc::new(Sleep));
    let limits = SchedulerLimits {
        slots,
        max_queue_depth,
        job_timeout: Duration::from_secs(10),
        idempotency_window: None,
        poll_interval: Duration::from_millis(10),
    };
    router(AppState::new(Scheduler::new(ledger, registry, limits)))
}

fn app() -> Router {
    app_with(2, 16)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_job(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn poll_until(app: &Router, id: i64, done: impl Fn(&JobView) -> bool) -> JobView {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (status, body) = send(app, get(&format!("/jobs/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let view: JobView = serde_json::from_slice(&body).unwrap();
        if done(&view) {
            return view;
        }
        assert!(Instant::now() < deadline, "job {id} stuck in {:?}", view.state);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn health_check() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["running"], 0);
}

#[tokio::test]
async fn algorithms_are_listed() {
    let (status, body) = send(&app(), get("/algorithms")).await;
    assert_eq!(status, StatusCode::OK);
    let list: Vec<AlgorithmDescriptor> = serde_json::from_slice(&body).unwrap();
    let names: Vec<_> = list.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["anagrams", "sleep", "transpose"]);
}

#[tokio::test]
async fn submit_then_poll_to_completion() {
    let app = app();
    let (status, body) = send(
        &app,
        post_job(json!({"algorithm": "anagrams", "version": "1", "input": "evil live vile"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let created: JobView = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.caller, "anonymous");

    let done = poll_until(&app, created.id, |v| v.state == JobState::Completed).await;
    assert_eq!(done.result, Some(json!([["evil", "live", "vile"]])));
}

#[tokio::test]
async fn idempotency_header_replays_existing_job() {
    let app = app();
    let req = || {
        Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .header("idempotency-key", "abc")
            .header("x-caller-id", "svc-a")
            .body(Body::from(
                json!({"algorithm": "sleep", "version": "1", "input": 50}).to_string(),
            ))
            .unwrap()
    };
    let (first_status, first) = send(&app, req()).await;
    let (second_status, second) = send(&app, req()).await;
    assert_eq!(first_status, StatusCode::ACCEPTED);
    assert_eq!(second_status, StatusCode::OK);
    let first: JobView = serde_json::from_slice(&first).unwrap();
    let second: JobView = serde_json::from_slice(&second).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.caller, "svc-a");
    assert_eq!(first.idempotency_key.as_deref(), Some("abc"));
}

#[tokio::test]
async fn validation_errors_are_422() {
    let app = app();
    let (status, body) = send(
        &app,
        post_job(json!({"algorithm": "transpose", "version": "1", "input": [[1, 2]]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::Validation);

    let (status, body) = send(&app, post_job(json!({"version": "1"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::Validation);

    let (status, body) = send(&app, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    let jobs: Vec<JobView> = serde_json::from_slice(&body).unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn full_queue_is_503() {
    let app = app_with(1, 0);
    let (status, body) = send(
        &app,
        post_job(json!({"algorithm": "anagrams", "version": "1", "input": "a"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::CapacityExceeded);
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = app();
    let (status, body) = send(&app, get("/jobs/12345")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::NotFound);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/jobs/12345")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_job_id_gets_json_error_body() {
    let app = app();
    let (status, body) = send(&app, get("/jobs/abc")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::Validation);
    assert!(!err.error.message.is_empty());

    let delete = Request::builder()
        .method("DELETE")
        .uri("/jobs/abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn delete_cancels_running_and_pending_jobs() {
    let app = app_with(1, 16);
    let (_, body) = send(
        &app,
        post_job(json!({"algorithm": "sleep", "version": "1", "input": 10_000})),
    )
    .await;
    let running: JobView = serde_json::from_slice(&body).unwrap();
    let (_, body) = send(
        &app,
        post_job(json!({"algorithm": "sleep", "version": "1", "input": 1, "priority": "high"})),
    )
    .await;
    let queued: JobView = serde_json::from_slice(&body).unwrap();
    assert_eq!(queued.state, JobState::Pending);

    for id in [queued.id, running.id] {
        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/jobs/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);
        let view: JobView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.state, JobState::Cancelled);
        assert_eq!(view.error.map(|e| e.kind), Some(ErrorKind::Cancelled));
    }

    let (_, body) = send(&app, get(&format!("/jobs/{}", queued.id))).await;
    let view: JobView = serde_json::from_slice(&body).unwrap();
    assert!(view.started_at.is_none());
}

#[tokio::test]
async fn list_is_newest_first_with_limit() {
    let app = app();
    let mut ids = Vec::new();
    for word in ["ab ba", "cd dc", "ef fe"] {
        let (_, body) = send(
            &app,
            post_job(json!({"algorithm": "anagrams", "version": "1", "input": word})),
        )
        .await;
        let view: JobView = serde_json::from_slice(&body).unwrap();
        ids.push(view.id);
    }
    let (status, body) = send(&app, get("/jobs?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let jobs: Vec<JobView> = serde_json::from_slice(&body).unwrap();
    let listed: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);
}
