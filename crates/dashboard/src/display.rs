//! Terminal Display
//!
//! Renders widget updates as `tracing` events under the `display` target.

use obd_scheduler::{DisplaySink, WarningMode};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Longest warning kept in the warning area, in characters
pub const MAX_WARNING_CHARS: usize = 160;

/// Display sink that keeps the widget state and logs every change
#[derive(Debug, Default)]
pub struct TerminalDisplay {
    gauge: Option<i64>,
    labels: BTreeMap<String, String>,
    warning: String,
    chart_points: u64,
    /// Warnings posted by the log writer thread, prepended on refresh
    alerts: Option<mpsc::Receiver<String>>,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show warnings sent through `alerts` on every refresh
    pub fn with_alerts(mut self, alerts: mpsc::Receiver<String>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn gauge(&self) -> Option<i64> {
        self.gauge
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Current contents of the warning area
    pub fn warning(&self) -> &str {
        &self.warning
    }

    pub fn chart_points(&self) -> u64 {
        self.chart_points
    }
}

impl DisplaySink for TerminalDisplay {
    fn set_gauge(&mut self, value: i64) {
        if self.gauge != Some(value) {
            debug!(target: "display", speed = value, "Gauge");
        }
        self.gauge = Some(value);
    }

    fn set_label(&mut self, name: &str, text: &str) {
        debug!(target: "display", name, value = text, "Label");
        self.labels.insert(name.to_string(), text.to_string());
    }

    fn set_warning(&mut self, text: &str, mode: WarningMode) {
        match mode {
            WarningMode::Replace => self.warning = text.to_string(),
            WarningMode::Prepend => self.warning.insert_str(0, text),
        }
        if let Some((cut, _)) = self.warning.char_indices().nth(MAX_WARNING_CHARS) {
            self.warning.truncate(cut);
        }

        if self.warning.is_empty() {
            info!(target: "display", "Warnings cleared");
        } else {
            warn!(target: "display", "{}", self.warning);
        }
    }

    fn append_chart_point(&mut self, series_a: f64, series_b: f64) {
        self.chart_points += 1;
        info!(target: "display", bank1 = series_a, bank2 = series_b, "Fuel trim");
    }

    fn refresh(&mut self) {
        while let Some(text) = self.alerts.as_mut().and_then(|alerts| alerts.try_recv().ok()) {
            self.set_warning(&text, WarningMode::Prepend);
        }
    }
}
