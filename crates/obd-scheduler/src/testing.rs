//! Test doubles shared by the scheduler tests

use crate::display::{DisplaySink, WarningMode};
use obd_protocol::{ElmStatus, Pid, ProtocolAdapter};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Display that records every update
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub gauge: Option<i64>,
    pub labels: HashMap<String, String>,
    pub warnings: Vec<(String, WarningMode)>,
    pub chart_points: Vec<(f64, f64)>,
    pub refreshes: u32,
}

impl RecordingDisplay {
    pub fn last_warning(&self) -> Option<&str> {
        self.warnings.last().map(|(text, _)| text.as_str())
    }
}

impl DisplaySink for RecordingDisplay {
    fn set_gauge(&mut self, value: i64) {
        self.gauge = Some(value);
    }

    fn set_label(&mut self, name: &str, text: &str) {
        self.labels.insert(name.to_string(), text.to_string());
    }

    fn set_warning(&mut self, text: &str, mode: WarningMode) {
        self.warnings.push((text.to_string(), mode));
    }

    fn append_chart_point(&mut self, series_a: f64, series_b: f64) {
        self.chart_points.push((series_a, series_b));
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

/// Adapter replaying scripted statuses.
///
/// Panics if a request is issued while another exchange is outstanding.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    pub script: VecDeque<(ElmStatus, Vec<u8>)>,
    pub issued: Vec<Pid>,
    pub connect_results: VecDeque<bool>,
    pub connected: bool,
    outstanding: bool,
    payload: Vec<u8>,
}

impl ScriptedAdapter {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn push(&mut self, status: ElmStatus, payload: &[u8]) -> &mut Self {
        self.script.push_back((status, payload.to_vec()));
        self
    }
}

impl ProtocolAdapter for ScriptedAdapter {
    fn connect(&mut self, _timeout: Duration) -> bool {
        self.connected = self.connect_results.pop_front().unwrap_or(true);
        self.connected
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn issue(&mut self, pid: Pid) {
        assert!(!self.outstanding, "request issued while an exchange is in flight");
        self.outstanding = true;
        self.issued.push(pid);
    }

    fn poll_status(&mut self) -> ElmStatus {
        if !self.outstanding {
            return ElmStatus::NO_RESPONSE;
        }
        let (status, payload) = self
            .script
            .pop_front()
            .unwrap_or((ElmStatus::GETTING_MSG, Vec::new()));
        if status != ElmStatus::GETTING_MSG && status != ElmStatus::MSG_RXD {
            self.outstanding = false;
        }
        self.payload = payload;
        status
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }
}
