use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::monitor::job::JobState;
use crate::monitor::logs::LogEntry;

/// Notification delivered to subscribers of a [`JobController`](crate::monitor::JobController).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    StateChanged { state: JobState },
    LogAppended { entry: LogEntry },
    Error { kind: ErrorKind, detail: String },
    /// The backend acknowledged the cancellation of a stopped job
    StopConfirmed { job_id: String },
    /// The lifetime guard ended polling while the job was still observed
    PollingExpired { job_id: String },
}

/// Fan-out of monitor events to every live subscriber.
///
/// Each subscriber gets its own unbounded queue so a slow reader never causes
/// another reader to miss a transition.
#[derive(Debug, Default)]
pub struct EventFeed {
    subscribers: Vec<mpsc::UnboundedSender<MonitorEvent>>,
}

impl EventFeed {
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MonitorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: MonitorEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
