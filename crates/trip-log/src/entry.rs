//! Log Entry

use serde::{Deserialize, Serialize};

/// Maximum characters kept for a parameter name or value
pub const FIELD_WIDTH: usize = 9;

/// One logged value. Fields are truncated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since start (monotonic)
    pub timestamp_ms: u64,
    pub name: String,
    pub value: String,
}

impl LogEntry {
    pub fn new(timestamp_ms: u64, name: &str, value: &str) -> Self {
        Self {
            timestamp_ms,
            name: truncate(name),
            value: truncate(value),
        }
    }

    /// Render as a log line: `\n<timestamp_ms>;<name>;<value>`
    pub fn line(&self) -> String {
        format!("\n{};{};{}", self.timestamp_ms, self.name, self.value)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(FIELD_WIDTH).collect()
}
