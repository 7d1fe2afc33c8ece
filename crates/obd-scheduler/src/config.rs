//! Scheduler Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the PID scheduler and its connection loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause after a failed exchange so the warning stays readable (0 disables)
    pub failure_pause_ms: u64,
    /// Timeout handed to each connect attempt
    pub connect_timeout_ms: u64,
}

impl SchedulerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            failure_pause_ms: 500,
            connect_timeout_ms: 2000,
        }
    }
}
