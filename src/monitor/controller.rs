use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;

use crate::backend::{JobBackend, RemoteStatus, StatusReport};
use crate::config::{MigrationConfig, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::monitor::clock::{Clock, SystemClock};
use crate::monitor::events::{EventFeed, MonitorEvent};
use crate::monitor::job::{JobHandle, JobState};
use crate::monitor::logs::{LogBuffer, LogEntry, LogLevel};
use crate::monitor::poller::PollCycle;

pub const SUBMITTED_MESSAGE: &str = "submitted";
pub const STOPPED_MESSAGE: &str = "stopped";

/// Point-in-time view of a controller for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub state: JobState,
    pub job_id: Option<String>,
    /// True while a submission is waiting on the backend
    pub submitting: bool,
    /// True while a poll cycle is active
    pub polling: bool,
    /// Time left before the lifetime guard ends polling
    pub polling_remaining_ms: Option<u64>,
    pub logs: Vec<LogEntry>,
}

/// Returned by [`JobController::stop`] once local teardown is complete.
///
/// The remote cancellation is still in flight at that point; await
/// [`StopAck::confirmed`] for the backend's answer.
#[derive(Debug)]
pub struct StopAck {
    pub job_id: String,
    confirmation: oneshot::Receiver<Result<()>>,
}

impl StopAck {
    pub async fn confirmed(self) -> Result<()> {
        self.confirmation.await.unwrap_or_else(|_| {
            Err(MonitorError::TransportError(
                "cancel request was dropped before completing".to_string(),
            ))
        })
    }
}

/// Everything guarded by the controller's single lock.
struct Session {
    state: JobState,
    handle: Option<JobHandle>,
    logs: LogBuffer,
    cycle: Option<PollCycle>,
    feed: EventFeed,
}

impl Session {
    fn set_state(&mut self, state: JobState) {
        if self.state != state {
            self.state = state;
            self.feed.publish(MonitorEvent::StateChanged { state });
        }
    }

    fn log(&mut self, timestamp: String, message: String, level: LogLevel) {
        let entry = self.logs.push_local(timestamp, message, level);
        self.feed.publish(MonitorEvent::LogAppended { entry });
    }

    /// Record an error as a log line and an explicit error notification.
    fn report_error(&mut self, timestamp: String, error: &MonitorError, message: String, level: LogLevel) {
        self.log(timestamp, message, level);
        self.feed.publish(MonitorEvent::Error {
            kind: error.kind(),
            detail: error.to_string(),
        });
    }

    fn is_current(&self, cycle_id: u64) -> bool {
        self.cycle.as_ref().is_some_and(|c| c.id() == cycle_id)
    }

    /// Forget the job: drop the poll cycle, handle and buffered lines.
    fn clear_job(&mut self) {
        self.cycle = None;
        self.handle = None;
        self.logs.clear();
    }
}

/// State shared between the controller handle and its poll cycle tasks.
/// Poll tasks only hold a `Weak` to it.
pub(crate) struct Shared {
    backend: Arc<dyn JobBackend>,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    session: Mutex<Session>,
    next_cycle: AtomicU64,
    /// Set for the duration of a backend `start` call, outside the lock.
    submitting: AtomicBool,
}

/// Clears the submitting flag however the submission ends, including when
/// the submitting future is dropped mid-request.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    pub(crate) fn backend(&self) -> Arc<dyn JobBackend> {
        self.backend.clone()
    }

    /// Apply one status fetch. Returns false when the cycle must end.
    pub(crate) async fn apply_report(&self, cycle_id: u64, report: StatusReport) -> bool {
        let mut session = self.session.lock().await;
        if !session.is_current(cycle_id) {
            return false;
        }

        let timestamp = report
            .last_update
            .clone()
            .unwrap_or_else(|| self.clock.timestamp());
        for entry in session.logs.merge_batch(&report.logs, &timestamp) {
            session.feed.publish(MonitorEvent::LogAppended { entry });
        }

        let job_id = session
            .handle
            .as_ref()
            .map(|h| h.id.clone())
            .unwrap_or_default();

        match report.status {
            RemoteStatus::Finished => {
                tracing::info!(job_id = %job_id, "Job finished");
                session.cycle = None;
                session.set_state(JobState::Succeeded);
                false
            }
            RemoteStatus::Failed | RemoteStatus::Canceled => {
                let error =
                    MonitorError::BackendError(format!("job {} reported {}", job_id, report.status));
                tracing::warn!(job_id = %job_id, status = %report.status, "Job ended unsuccessfully");
                session.report_error(
                    self.clock.timestamp(),
                    &error,
                    format!("job ended with status {}", report.status),
                    LogLevel::Error,
                );
                session.cycle = None;
                session.set_state(JobState::Failed);
                false
            }
            RemoteStatus::Running | RemoteStatus::Other(_) => true,
        }
    }

    /// A failed fetch is logged and polling continues.
    pub(crate) async fn apply_fetch_error(&self, cycle_id: u64, error: MonitorError) -> bool {
        let mut session = self.session.lock().await;
        if !session.is_current(cycle_id) {
            return false;
        }

        tracing::warn!(error = %error, "Status poll failed");
        session.report_error(
            self.clock.timestamp(),
            &error,
            format!("status poll failed: {}", error),
            LogLevel::Warn,
        );
        true
    }

    /// Lifetime guard fired: stop polling but leave the job state alone.
    pub(crate) async fn expire_cycle(&self, cycle_id: u64) {
        let mut session = self.session.lock().await;
        if !session.is_current(cycle_id) {
            return;
        }

        let job_id = session
            .handle
            .as_ref()
            .map(|h| h.id.clone())
            .unwrap_or_default();
        let minutes = self.config.max_lifetime().as_secs() / 60;
        session.log(
            self.clock.timestamp(),
            format!(
                "polling stopped after {} min; job state may be stale",
                minutes
            ),
            LogLevel::Warn,
        );
        session.feed.publish(MonitorEvent::PollingExpired { job_id });
        session.cycle = None;
    }
}

/// Owns the lifecycle of one monitored migration job.
///
/// Cheap to clone; clones share the same session. Stop, reset and every
/// poll result are serialized through one lock, so ticks and user actions
/// never interleave mid-update. Submit takes the lock before and after its
/// backend call but not across it.
#[derive(Clone)]
pub struct JobController {
    shared: Arc<Shared>,
}

impl JobController {
    pub fn new(backend: Arc<dyn JobBackend>, config: MonitorConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn JobBackend>,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Session {
            state: JobState::Idle,
            handle: None,
            logs: LogBuffer::new(config.log_capacity, config.log_merge),
            cycle: None,
            feed: EventFeed::default(),
        };
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                clock,
                session: Mutex::new(session),
                next_cycle: AtomicU64::new(1),
                submitting: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Receive every subsequent state change, log line and error.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        self.shared.session.lock().await.feed.subscribe()
    }

    pub async fn state(&self) -> JobState {
        self.shared.session.lock().await.state
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let session = self.shared.session.lock().await;
        let now = Instant::now();
        MonitorSnapshot {
            state: session.state,
            job_id: session.handle.as_ref().map(|h| h.id.clone()),
            submitting: self.shared.submitting.load(Ordering::SeqCst),
            polling: session.cycle.is_some(),
            polling_remaining_ms: session
                .cycle
                .as_ref()
                .map(|c| c.deadline().saturating_duration_since(now).as_millis() as u64),
            logs: session.logs.to_vec(),
        }
    }

    /// Submit a job and start polling it.
    ///
    /// A finished or failed previous job is reset first. A backend rejection
    /// moves the controller to `Failed` without a handle. The session lock is
    /// released while the backend call is in flight; a second submit in that
    /// window is rejected.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a job is running or being submitted, otherwise
    /// whatever the backend returned.
    pub async fn submit(&self, config: &MigrationConfig) -> Result<JobHandle> {
        let guard = {
            let mut session = self.shared.session.lock().await;
            if session.state == JobState::Running
                || self
                    .shared
                    .submitting
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return Err(MonitorError::AlreadyRunning);
            }
            if session.state.is_terminal() {
                session.clear_job();
                session.set_state(JobState::Idle);
            }
            session.logs.clear();
            SubmitGuard(&self.shared.submitting)
        };

        let result = self.shared.backend.start(config).await;

        let mut session = self.shared.session.lock().await;
        drop(guard);
        match result {
            Ok(job_id) => {
                let handle = JobHandle::new(job_id);
                session.handle = Some(handle.clone());
                session.set_state(JobState::Running);
                session.log(
                    self.shared.clock.timestamp(),
                    SUBMITTED_MESSAGE.to_string(),
                    LogLevel::Info,
                );

                let cycle_id = self.shared.next_cycle.fetch_add(1, Ordering::Relaxed);
                session.cycle = Some(PollCycle::start(
                    Arc::downgrade(&self.shared),
                    handle.clone(),
                    cycle_id,
                    self.shared.config.poll_interval(),
                    self.shared.config.max_lifetime(),
                ));

                tracing::info!(job_id = %handle, cycle_id, "Job submitted, polling started");
                Ok(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Job submission failed");
                session.report_error(
                    self.shared.clock.timestamp(),
                    &e,
                    format!("submission failed: {}", e),
                    LogLevel::Error,
                );
                session.set_state(JobState::Failed);
                Err(e)
            }
        }
    }

    /// Stop the running job.
    ///
    /// Polling is torn down and the controller is back to `Idle` before this
    /// returns; the remote cancel is best-effort and reported through the
    /// returned [`StopAck`] and a `StopConfirmed` or `Error` event.
    pub async fn stop(&self) -> Result<StopAck> {
        let mut session = self.shared.session.lock().await;
        if session.state != JobState::Running {
            return Err(MonitorError::NoActiveJob);
        }
        let handle = session.handle.clone().ok_or(MonitorError::NoActiveJob)?;

        session.clear_job();
        session.set_state(JobState::Idle);
        session.log(
            self.shared.clock.timestamp(),
            STOPPED_MESSAGE.to_string(),
            LogLevel::Info,
        );
        drop(session);

        tracing::info!(job_id = %handle, "Job stopped locally, cancelling remotely");

        let (tx, rx) = oneshot::channel();
        let backend = self.shared.backend.clone();
        let shared = Arc::downgrade(&self.shared);
        let job_id = handle.id.clone();
        tokio::spawn(async move {
            let result = backend.cancel(&job_id).await;
            if let Some(shared) = shared.upgrade() {
                let mut session = shared.session.lock().await;
                match &result {
                    Ok(()) => {
                        tracing::info!(job_id = %job_id, "Remote cancel confirmed");
                        session.feed.publish(MonitorEvent::StopConfirmed {
                            job_id: job_id.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Remote cancel failed");
                        session.feed.publish(MonitorEvent::Error {
                            kind: e.kind(),
                            detail: format!("cancel of job {} failed: {}", job_id, e),
                        });
                    }
                }
            }
            let _ = tx.send(result);
        });

        Ok(StopAck {
            job_id: handle.id,
            confirmation: rx,
        })
    }

    /// Return to `Idle` after a finished or failed job.
    pub async fn reset(&self) -> Result<()> {
        let mut session = self.shared.session.lock().await;
        if session.state == JobState::Running {
            return Err(MonitorError::InvalidState(JobState::Running));
        }
        session.clear_job();
        session.set_state(JobState::Idle);
        Ok(())
    }
}
