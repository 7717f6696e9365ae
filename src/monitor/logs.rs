use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::LogMergeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of job output as shown to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the controller's append order
    pub seq: u64,
    pub timestamp: String,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    /// Dedup key. `seq` and `level` are not part of it.
    fn same_line(&self, timestamp: &str, message: &str) -> bool {
        self.timestamp == timestamp && self.message == message
    }
}

/// Bounded, deduplicating log buffer owned by one controller.
///
/// Remote batches come in with a single `lastUpdate` timestamp for every
/// line, so the `(timestamp, message)` key cannot tell apart two identical
/// lines of the same batch. In [`LogMergeMode::Cumulative`] the buffer also
/// tracks how many lines of the backend's cumulative log it has consumed, so
/// a redelivered history with a fresh `lastUpdate` is not appended again.
#[derive(Debug)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    mode: LogMergeMode,
    remote_cursor: usize,
    next_seq: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize, mode: LogMergeMode) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.saturating_add(1)),
            capacity: capacity.max(1),
            mode,
            remote_cursor: 0,
            next_seq: 1,
        }
    }

    /// Append a locally produced line (submitted, stopped, warnings).
    ///
    /// Local lines are never deduplicated: two identical failures within
    /// the same clock second are two lines.
    pub fn push_local(
        &mut self,
        timestamp: impl Into<String>,
        message: impl Into<String>,
        level: LogLevel,
    ) -> LogEntry {
        let entry = self.append(timestamp.into(), message.into(), level);
        self.evict();
        entry
    }

    /// Merge one remote batch sharing `last_update`. Returns the entries that
    /// were appended, in order.
    pub fn merge_batch(&mut self, lines: &[String], last_update: &str) -> Vec<LogEntry> {
        let start = match self.mode {
            LogMergeMode::Keyed => 0,
            LogMergeMode::Cumulative => {
                let start = if lines.len() >= self.remote_cursor {
                    self.remote_cursor
                } else {
                    tracing::debug!(
                        cursor = self.remote_cursor,
                        received = lines.len(),
                        "Remote log shrank, rescanning batch"
                    );
                    0
                };
                self.remote_cursor = lines.len();
                start
            }
        };

        let appended: Vec<LogEntry> = lines[start..]
            .iter()
            .filter_map(|line| {
                if self.contains(last_update, line) {
                    return None;
                }
                Some(self.append(last_update.to_string(), line.clone(), LogLevel::Info))
            })
            .collect();
        self.evict();
        appended
    }

    fn append(&mut self, timestamp: String, message: String, level: LogLevel) -> LogEntry {
        let entry = LogEntry {
            seq: self.next_seq,
            timestamp,
            message,
            level,
        };
        self.next_seq += 1;
        self.entries.push_back(entry.clone());
        entry
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn contains(&self, timestamp: &str, message: &str) -> bool {
        self.entries.iter().any(|e| e.same_line(timestamp, message))
    }

    /// Drop all entries and forget the remote cursor. Sequence numbers keep
    /// increasing across clears.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.remote_cursor = 0;
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
