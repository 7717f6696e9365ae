use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_stream::{wrappers::UnboundedReceiverStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::MigrationConfig;
use crate::error::MonitorError;
use crate::monitor::JobController;

#[derive(Clone)]
pub struct DashboardState {
    pub controller: JobController,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
    job_id: Option<String>,
    error: Option<String>,
}

impl ActionResponse {
    fn ok(job_id: Option<String>) -> Self {
        Self {
            success: true,
            job_id,
            error: None,
        }
    }

    fn failed(error: &MonitorError) -> (StatusCode, Json<Self>) {
        (
            status_for(error),
            Json(Self {
                success: false,
                job_id: None,
                error: Some(error.to_string()),
            }),
        )
    }
}

/// HTTP status for a monitor error: precondition violations are conflicts,
/// engine failures are bad gateways.
pub fn status_for(error: &MonitorError) -> StatusCode {
    match error {
        MonitorError::AlreadyRunning
        | MonitorError::NoActiveJob
        | MonitorError::InvalidState(_) => StatusCode::CONFLICT,
        MonitorError::TransportError(_) | MonitorError::BackendError(_) => StatusCode::BAD_GATEWAY,
        MonitorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
    }
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/monitor", get(snapshot_handler))
        .route("/api/monitor/events", get(events_handler))
        .route("/api/monitor/submit", post(submit_handler))
        .route("/api/monitor/stop", post(stop_handler))
        .route("/api/monitor/reset", post(reset_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the dashboard until `shutdown` is cancelled.
pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn snapshot_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.controller.snapshot().await)
}

async fn events_handler(
    State(state): State<DashboardState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.controller.subscribe().await;
    let stream = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn submit_handler(
    State(state): State<DashboardState>,
    Json(config): Json<MigrationConfig>,
) -> impl IntoResponse {
    if let Err(e) = config.validate() {
        return ActionResponse::failed(&e);
    }

    match state.controller.submit(&config).await {
        Ok(handle) => (StatusCode::OK, Json(ActionResponse::ok(Some(handle.id)))),
        Err(e) => ActionResponse::failed(&e),
    }
}

async fn stop_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Ok(ack) => (StatusCode::OK, Json(ActionResponse::ok(Some(ack.job_id)))),
        Err(e) => ActionResponse::failed(&e),
    }
}

async fn reset_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.controller.reset().await {
        Ok(()) => (StatusCode::OK, Json(ActionResponse::ok(None))),
        Err(e) => ActionResponse::failed(&e),
    }
}
