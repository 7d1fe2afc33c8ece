//! Dashboard Settings
//!
//! Layered configuration: serde defaults, then an optional file, then
//! `OBD_DASH__*` environment variables (e.g. `OBD_DASH__ADAPTER__KIND=serial`).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use obd_protocol::DEFAULT_EXCHANGE_TIMEOUT_MS;
use obd_scheduler::{default_tasks, SchedulerConfig, TaskSpec};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use trip_log::{DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY};

/// Config file looked up when none is given (any supported extension)
pub const DEFAULT_CONFIG: &str = "obd-dash";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OBD_DASH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Simulated adapter, no hardware needed
    Mock,
    /// ELM327 on a serial device
    Serial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub kind: AdapterKind,
    /// Serial device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    pub baud_rate: u32,
    /// Per-exchange timeout
    pub timeout_ms: u64,
    /// Pending polls before the mock adapter answers
    pub mock_latency_polls: u32,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            kind: AdapterKind::Mock,
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            timeout_ms: DEFAULT_EXCHANGE_TIMEOUT_MS,
            mock_latency_polls: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Directory holding the numbered trip logs
    pub dir: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Complete dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub adapter: AdapterSettings,
    pub scheduler: SchedulerConfig,
    pub tasks: Vec<TaskSpec>,
    pub log: LogSettings,
    /// Sleep between loop iterations
    pub loop_interval_ms: u64,
    /// Prometheus exporter address, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adapter: AdapterSettings::default(),
            scheduler: SchedulerConfig::default(),
            tasks: default_tasks(),
            log: LogSettings::default(),
            loop_interval_ms: 10,
            metrics_addr: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = File::with_name(path.unwrap_or(DEFAULT_CONFIG)).required(path.is_some());

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}
