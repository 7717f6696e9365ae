use serde::Serialize;
use thiserror::Error;

use crate::monitor::JobState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("A job is already running")]
    AlreadyRunning,

    #[error("No active job")]
    NoActiveJob,

    #[error("Operation not allowed while job is {0}")]
    InvalidState(JobState),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::AlreadyRunning => ErrorKind::AlreadyRunning,
            MonitorError::NoActiveJob => ErrorKind::NoActiveJob,
            MonitorError::InvalidState(_) => ErrorKind::InvalidState,
            MonitorError::TransportError(_) => ErrorKind::TransportError,
            MonitorError::BackendError(_) => ErrorKind::BackendError,
            MonitorError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// True for errors rejected locally before any backend call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MonitorError::AlreadyRunning
                | MonitorError::NoActiveJob
                | MonitorError::InvalidState(_)
        )
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        MonitorError::TransportError(e.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::InvalidConfig(e.to_string())
    }
}

/// Error classification delivered to observers alongside a detail string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyRunning,
    NoActiveJob,
    InvalidState,
    TransportError,
    BackendError,
    InvalidConfig,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AlreadyRunning => write!(f, "already_running"),
            ErrorKind::NoActiveJob => write!(f, "no_active_job"),
            ErrorKind::InvalidState => write!(f, "invalid_state"),
            ErrorKind::TransportError => write!(f, "transport_error"),
            ErrorKind::BackendError => write!(f, "backend_error"),
            ErrorKind::InvalidConfig => write!(f, "invalid_config"),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_are_classified() {
        assert!(MonitorError::AlreadyRunning.is_precondition());
        assert!(MonitorError::NoActiveJob.is_precondition());
        assert!(MonitorError::InvalidState(JobState::Running).is_precondition());
        assert!(!MonitorError::TransportError("reset".into()).is_precondition());
        assert!(!MonitorError::BackendError("rejected".into()).is_precondition());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            MonitorError::TransportError("x".into()).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            MonitorError::InvalidState(JobState::Running).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(ErrorKind::BackendError.to_string(), "backend_error");
    }

    #[test]
    fn invalid_state_message_names_state() {
        let err = MonitorError::InvalidState(JobState::Running);
        assert_eq!(err.to_string(), "Operation not allowed while job is running");
    }
}
