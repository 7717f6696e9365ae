use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// How incoming remote log batches are deduplicated against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMergeMode {
    /// The backend returns its whole log on every poll. Only lines past the
    /// remote cursor are candidates; the `(timestamp, message)` key still
    /// applies to them.
    #[default]
    Cumulative,
    /// Every line of every batch is a candidate; only the
    /// `(timestamp, message)` key filters duplicates.
    Keyed,
}

/// Timing and retention knobs for one job monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between status fetches
    pub poll_interval_ms: u64,
    /// Hard cap on how long a single poll cycle may run
    pub max_lifetime_ms: u64,
    /// Number of log entries retained (oldest evicted first)
    pub log_capacity: usize,
    pub log_merge: LogMergeMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_lifetime_ms: 600_000,
            log_capacity: 50,
            log_merge: LogMergeMode::Cumulative,
        }
    }
}

impl MonitorConfig {
    /// Never zero; a zero period would stop the poll timer from ticking.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms.max(1))
    }

    /// Reject timings that cannot drive a poll cycle.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "poll interval must be at least 1 ms".to_string(),
            ));
        }
        if self.max_lifetime_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "max lifetime must be at least 1 ms".to_string(),
            ));
        }
        if self.log_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "log capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    pub fn with_log_merge(mut self, mode: LogMergeMode) -> Self {
        self.log_merge = mode;
        self
    }
}

/// Connection settings for the FlinkOMT console REST API.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. "http://127.0.0.1:5000"
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Source cluster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarRocksConfig {
    pub host: String,
    pub port: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Table pattern, e.g. "db.table" or "test[1-2].orders[0-9]"
    pub tables: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_max_retries: Option<String>,
}

impl Default for StarRocksConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "9030".to_string(),
            username: "root".to_string(),
            password: String::new(),
            tables: String::new(),
            scan_port: None,
            scan_max_retries: None,
        }
    }
}

/// Target cluster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OceanBaseConfig {
    pub host: String,
    pub port: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl Default for OceanBaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "2881".to_string(),
            username: "root@test".to_string(),
            password: String::new(),
            database: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlinkOmtConfig {
    /// Checkpoint interval in milliseconds
    pub checkpoint_interval: String,
    pub parallelism: String,
}

impl Default for FlinkOmtConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: "60000".to_string(),
            parallelism: "1".to_string(),
        }
    }
}

/// Payload handed to the backend when a migration job is submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub starrocks: StarRocksConfig,
    #[serde(default)]
    pub oceanbase: OceanBaseConfig,
    #[serde(rename = "flinkOMT", default)]
    pub flink_omt: FlinkOmtConfig,
}

impl MigrationConfig {
    /// Load a migration config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: MigrationConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check that every field the job submission needs is filled in.
    /// Connectivity is not checked.
    pub fn validate(&self) -> Result<()> {
        let sr = &self.starrocks;
        if sr.host.is_empty() || sr.port.is_empty() || sr.username.is_empty() || sr.tables.is_empty()
        {
            return Err(MonitorError::InvalidConfig(
                "incomplete StarRocks config (host, port, username and tables are required)"
                    .to_string(),
            ));
        }

        let ob = &self.oceanbase;
        if ob.host.is_empty() || ob.port.is_empty() || ob.username.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "incomplete OceanBase config (host, port and username are required)".to_string(),
            ));
        }

        if self.flink_omt.parallelism.parse::<u32>().map_or(true, |p| p == 0) {
            return Err(MonitorError::InvalidConfig(format!(
                "parallelism must be a positive integer, got {:?}",
                self.flink_omt.parallelism
            )));
        }
        if self.flink_omt.checkpoint_interval.parse::<u64>().is_err() {
            return Err(MonitorError::InvalidConfig(format!(
                "checkpointInterval must be milliseconds, got {:?}",
                self.flink_omt.checkpoint_interval
            )));
        }

        Ok(())
    }
}
