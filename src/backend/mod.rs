//! Execution-engine capability consumed by the job monitor.
//!
//! The monitor never talks to Flink directly. It submits, polls and cancels
//! through a [`JobBackend`], which keeps the state machine testable against a
//! scripted backend and lets [`HttpBackend`] speak the console REST API.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MigrationConfig;
use crate::error::Result;

pub use http::HttpBackend;

/// Status string reported by the engine for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteStatus {
    Running,
    Finished,
    Failed,
    Canceled,
    /// Anything else the engine reports (SUBMITTED, CREATED, NO_JOB, ...).
    /// Treated as non-terminal.
    Other(String),
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Finished | RemoteStatus::Failed | RemoteStatus::Canceled
        )
    }
}

impl From<String> for RemoteStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => RemoteStatus::Running,
            "FINISHED" => RemoteStatus::Finished,
            "FAILED" => RemoteStatus::Failed,
            "CANCELED" | "CANCELLED" => RemoteStatus::Canceled,
            _ => RemoteStatus::Other(s),
        }
    }
}

impl From<RemoteStatus> for String {
    fn from(status: RemoteStatus) -> Self {
        status.to_string()
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteStatus::Running => write!(f, "RUNNING"),
            RemoteStatus::Finished => write!(f, "FINISHED"),
            RemoteStatus::Failed => write!(f, "FAILED"),
            RemoteStatus::Canceled => write!(f, "CANCELED"),
            RemoteStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One status fetch: the engine state, the log lines it returned and the
/// single timestamp the engine attached to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    pub logs: Vec<String>,
    pub last_update: Option<String>,
}

impl StatusReport {
    pub fn new(status: RemoteStatus, logs: Vec<String>, last_update: impl Into<String>) -> Self {
        Self {
            status,
            logs,
            last_update: Some(last_update.into()),
        }
    }
}

/// Submit/status/cancel capability of the execution engine.
///
/// Implementations return [`MonitorError::TransportError`](crate::error::MonitorError::TransportError)
/// for I/O or decoding failures and
/// [`MonitorError::BackendError`](crate::error::MonitorError::BackendError)
/// when the engine answers with a failure payload.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Submit a migration job; returns the job id issued by the engine.
    async fn start(&self, config: &MigrationConfig) -> Result<String>;

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport>;

    async fn cancel(&self, job_id: &str) -> Result<()>;
}
