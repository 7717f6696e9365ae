//! `HttpBackend` against a loopback server emulating the migration console.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use omt_watch::backend::{HttpBackend, JobBackend, RemoteStatus};
use omt_watch::config::{BackendConfig, MigrationConfig, StarRocksConfig};
use omt_watch::error::{ErrorKind, MonitorError};

#[derive(Clone, Default)]
struct Console {
    submitted: Arc<Mutex<Vec<Value>>>,
    stopped: Arc<Mutex<Vec<String>>>,
}

async fn start_job(State(console): State<Console>, Json(body): Json<Value>) -> impl IntoResponse {
    console.submitted.lock().unwrap().push(body);
    Json(json!({ "jobId": "job-1" }))
}

async fn job_status(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "job-1" => (
            StatusCode::OK,
            Json(json!({
                "status": "RUNNING",
                "logs": ["starting", "copying test2.orders"],
                "lastUpdate": "10:00:02",
                "flinkJobId": "f00d"
            })),
        )
            .into_response(),
        "fresh" => (StatusCode::OK, Json(json!({ "status": "SUBMITTED" }))).into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found" })),
        )
            .into_response(),
    }
}

async fn stop_job(State(console): State<Console>, Path(id): Path<String>) -> impl IntoResponse {
    console.stopped.lock().unwrap().push(id);
    Json(json!({ "success": true }))
}

async fn spawn_console() -> (SocketAddr, Console) {
    let console = Console::default();
    let app = Router::new()
        .route("/api/start-job", post(start_job))
        .route("/api/job-status/:id", get(job_status))
        .route("/api/stop-job/:id", post(stop_job))
        .with_state(console.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, console)
}

fn backend_for(addr: SocketAddr) -> HttpBackend {
    // Trailing slash must not produce "//api/..."
    HttpBackend::new(&BackendConfig::new(format!("http://{}/", addr))).unwrap()
}

fn migration_config() -> MigrationConfig {
    MigrationConfig {
        starrocks: StarRocksConfig {
            host: "10.0.0.5".to_string(),
            tables: "test2.orders".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_start_posts_console_payload() {
    let (addr, console) = spawn_console().await;
    let backend = backend_for(addr);

    let job_id = backend.start(&migration_config()).await.unwrap();
    assert_eq!(job_id, "job-1");

    let submitted = console.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["starrocks"]["host"], "10.0.0.5");
    assert_eq!(submitted[0]["starrocks"]["tables"], "test2.orders");
    assert_eq!(submitted[0]["flinkOMT"]["checkpointInterval"], "60000");
}

#[tokio::test]
async fn test_fetch_status_decodes_report() {
    let (addr, _console) = spawn_console().await;
    let backend = backend_for(addr);

    let report = backend.fetch_status("job-1").await.unwrap();
    assert_eq!(report.status, RemoteStatus::Running);
    assert_eq!(report.logs, vec!["starting", "copying test2.orders"]);
    assert_eq!(report.last_update.as_deref(), Some("10:00:02"));
}

#[tokio::test]
async fn test_fetch_status_tolerates_missing_fields() {
    let (addr, _console) = spawn_console().await;
    let backend = backend_for(addr);

    let report = backend.fetch_status("fresh").await.unwrap();
    assert_eq!(report.status, RemoteStatus::Other("SUBMITTED".to_string()));
    assert!(report.logs.is_empty());
    assert!(report.last_update.is_none());
}

#[tokio::test]
async fn test_error_payload_becomes_backend_error() {
    let (addr, _console) = spawn_console().await;
    let backend = backend_for(addr);

    let err = backend.fetch_status("missing").await.unwrap_err();
    assert_eq!(
        err,
        MonitorError::BackendError("HTTP 404: Job not found".to_string())
    );

    let err = backend.fetch_status("broken").await.unwrap_err();
    assert_eq!(err, MonitorError::BackendError("HTTP 500: boom".to_string()));
}

#[tokio::test]
async fn test_cancel_posts_stop() {
    let (addr, console) = spawn_console().await;
    let backend = backend_for(addr);

    backend.cancel("job-1").await.unwrap();
    assert_eq!(*console.stopped.lock().unwrap(), vec!["job-1".to_string()]);
}

#[tokio::test]
async fn test_unreachable_console_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = backend_for(addr);
    let err = backend.fetch_status("job-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);
}
