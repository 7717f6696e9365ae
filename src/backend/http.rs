use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::backend::{JobBackend, RemoteStatus, StatusReport};
use crate::config::{BackendConfig, MigrationConfig};
use crate::error::{MonitorError, Result};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJobResponse {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    status: RemoteStatus,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    flink_job_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`JobBackend`] speaking the FlinkOMT console REST API
/// (`/api/start-job`, `/api/job-status/{id}`, `/api/stop-job/{id}`).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx answer into a `BackendError` carrying the engine's message.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(MonitorError::BackendError(format!(
            "HTTP {}: {}",
            status.as_u16(),
            detail
        )))
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn start(&self, config: &MigrationConfig) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/start-job"))
            .json(config)
            .send()
            .await?;
        let body: StartJobResponse = Self::check(response).await?.json().await?;
        tracing::debug!(job_id = %body.job_id, "Backend accepted job");
        Ok(body.job_id)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport> {
        let response = self
            .client
            .get(self.url(&format!("/api/job-status/{}", job_id)))
            .send()
            .await?;
        let body: JobStatusResponse = Self::check(response).await?.json().await?;
        tracing::trace!(
            job_id,
            status = %body.status,
            flink_job_id = ?body.flink_job_id,
            lines = body.logs.len(),
            "Fetched job status"
        );
        Ok(StatusReport {
            status: body.status,
            logs: body.logs,
            last_update: body.last_update,
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/stop-job/{}", job_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
