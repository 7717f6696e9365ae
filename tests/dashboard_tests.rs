
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use omt_watch::backend::RemoteStatus;
use omt_watch::dashboard::{router, status_for, DashboardState};
use omt_watch::error::MonitorError;
use omt_watch::monitor::JobState;
use test_harness::{test_controller, ScriptedBackend};

/// Dashboard over a backend that accepts one job and reports it running.
fn create_test_app() -> Router {
    let backend = ScriptedBackend::accepting("j1");
    backend.set_steady(RemoteStatus::Running, &[], "10:00:02");
    router(DashboardState {
        controller: test_controller(backend),
    })
}

fn submit_body() -> Value {
    json!({
        "starrocks": {
            "host": "127.0.0.1",
            "port": "9030",
            "username": "root",
            "password": "",
            "tables": "test2.*"
        },
        "oceanbase": {
            "host": "127.0.0.1",
            "port": "2881",
            "username": "root@test",
            "password": ""
        },
        "flinkOMT": {
            "checkpointInterval": "60000",
            "parallelism": "2"
        }
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

#[tokio::test]
async fn test_snapshot_starts_idle() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/api/monitor", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "idle");
    assert!(json["job_id"].is_null());
    assert_eq!(json["polling"], false);
    assert_eq!(json["logs"], json!([]));
}

#[tokio::test]
async fn test_submit_starts_job() {
    let app = create_test_app();

    let (status, json) = send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["job_id"], "j1");

    let (_, snapshot) = send(&app, "GET", "/api/monitor", None).await;
    assert_eq!(snapshot["state"], "running");
    assert_eq!(snapshot["job_id"], "j1");
    assert_eq!(snapshot["polling"], true);
    assert_eq!(snapshot["logs"][0]["message"], "submitted");
    assert_eq!(snapshot["logs"][0]["level"], "info");
}

#[tokio::test]
async fn test_second_submit_conflicts() {
    let app = create_test_app();

    send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;
    let (status, json) = send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "A job is already running");
}

#[tokio::test]
async fn test_incomplete_config_is_bad_request() {
    let app = create_test_app();
    let mut body = submit_body();
    body["starrocks"]["tables"] = json!("");

    let (status, json) = send(&app, "POST", "/api/monitor/submit", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("StarRocks"));

    let (_, snapshot) = send(&app, "GET", "/api/monitor", None).await;
    assert_eq!(snapshot["state"], "idle");
}

#[tokio::test]
async fn test_rejected_submission_is_bad_gateway() {
    let app = router(DashboardState {
        controller: test_controller(ScriptedBackend::new()),
    });

    let (status, json) = send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);

    let (_, snapshot) = send(&app, "GET", "/api/monitor", None).await;
    assert_eq!(snapshot["state"], "failed");
    assert!(snapshot["job_id"].is_null());
}

#[tokio::test]
async fn test_stop_without_job_conflicts() {
    let app = create_test_app();

    let (status, json) = send(&app, "POST", "/api/monitor/stop", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "No active job");
}

#[tokio::test]
async fn test_stop_returns_to_idle() {
    let app = create_test_app();
    send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;

    let (status, json) = send(&app, "POST", "/api/monitor/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["job_id"], "j1");

    let (_, snapshot) = send(&app, "GET", "/api/monitor", None).await;
    assert_eq!(snapshot["state"], "idle");
    assert!(snapshot["job_id"].is_null());
    assert_eq!(snapshot["logs"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["logs"][0]["message"], "stopped");
}

#[tokio::test]
async fn test_reset_while_running_conflicts() {
    let app = create_test_app();
    send(&app, "POST", "/api/monitor/submit", Some(submit_body())).await;

    let (status, json) = send(&app, "POST", "/api/monitor/reset", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Operation not allowed while job is running");
}

#[tokio::test]
async fn test_reset_when_idle_succeeds() {
    let app = create_test_app();

    let (status, json) = send(&app, "POST", "/api/monitor/reset", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[test]
fn test_error_status_mapping() {
    assert_eq!(status_for(&MonitorError::AlreadyRunning), StatusCode::CONFLICT);
    assert_eq!(status_for(&MonitorError::NoActiveJob), StatusCode::CONFLICT);
    assert_eq!(
        status_for(&MonitorError::InvalidState(JobState::Running)),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_for(&MonitorError::TransportError("refused".into())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&MonitorError::BackendError("HTTP 500".into())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&MonitorError::InvalidConfig("empty".into())),
        StatusCode::BAD_REQUEST
    );
}
