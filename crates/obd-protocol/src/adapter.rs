//! Protocol Adapter Interface
//!
//! The transport supports a single outstanding request. An adapter begins an
//! exchange with [`ProtocolAdapter::issue`] and reports its progress through
//! [`ProtocolAdapter::poll_status`] without blocking the caller.

use crate::pid::Pid;
use crate::status::ElmStatus;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info};

/// A half-duplex link to an OBD-II protocol adapter
pub trait ProtocolAdapter {
    /// Try to (re)establish the link, returning whether it is usable
    fn connect(&mut self, timeout: Duration) -> bool;

    /// Whether the link is currently up
    fn is_connected(&self) -> bool;

    /// Send the request for `pid`, starting a new exchange
    fn issue(&mut self, pid: Pid);

    /// Progress of the current exchange. Yields `NO_RESPONSE` when none is outstanding.
    fn poll_status(&mut self) -> ElmStatus;

    /// Payload of the last successful exchange
    fn payload(&self) -> &[u8];
}

/// Simulated adapter for running without hardware
pub struct MockAdapter {
    connected: bool,
    /// Connect attempts that still fail before one succeeds
    failing_connects: u32,
    /// Pending polls before each response arrives
    latency_polls: u32,
    in_flight: Option<(Pid, u32)>,
    payload: Vec<u8>,
    sequence: u64,
}

impl MockAdapter {
    /// Create a mock adapter that answers after `latency_polls` pending polls
    pub fn new(latency_polls: u32) -> Self {
        info!("Creating mock OBD adapter");
        Self {
            connected: false,
            failing_connects: 0,
            latency_polls,
            in_flight: None,
            payload: Vec::new(),
            sequence: 0,
        }
    }

    /// Make the first `attempts` connect calls fail
    pub fn with_failing_connects(mut self, attempts: u32) -> Self {
        self.failing_connects = attempts;
        self
    }

    /// Simulate the link dropping
    pub fn disconnect(&mut self) {
        if self.connected {
            info!("Mock adapter disconnected");
            self.connected = false;
            self.in_flight = None;
        }
    }

    /// Generate a plausible payload for `pid`
    fn generate_payload(&mut self, pid: Pid) -> Vec<u8> {
        // Deterministic pseudo-random values keyed on the request sequence
        let mut hasher = DefaultHasher::new();
        self.sequence.hash(&mut hasher);
        pid.hash(&mut hasher);
        let hash = hasher.finish();
        self.sequence += 1;

        match pid {
            // RPM: 800-3500
            Pid::Rpm => {
                let rpm = 800 + (hash % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // MAF: 5-50 g/s
            Pid::Maf => {
                let maf = 500 + (hash % 4500) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            Pid::Speed => vec![(hash % 120) as u8],
            // Fuel trims: roughly -10% to +10%
            Pid::ShortFuelTrimBank1
            | Pid::LongFuelTrimBank1
            | Pid::ShortFuelTrimBank2
            | Pid::LongFuelTrimBank2 => vec![(70 + (hash % 17)) as u8],
            // Coolant temp: 70-105°C (stored as value + 40)
            Pid::CoolantTemp => vec![(110 + (hash % 35)) as u8],
            Pid::EngineLoad | Pid::ThrottlePosition => vec![(51 + (hash % 153)) as u8],
            Pid::IntakeManifoldPressure => vec![(30 + (hash % 70)) as u8],
            // Mostly no stored codes, occasionally a misfire
            Pid::StoredDtcs if hash % 10 == 0 => vec![0x01, 0x03, 0x00],
            Pid::StoredDtcs => vec![0x00],
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ProtocolAdapter for MockAdapter {
    fn connect(&mut self, _timeout: Duration) -> bool {
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            debug!("Mock adapter refusing connection");
            return false;
        }
        self.connected = true;
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn issue(&mut self, pid: Pid) {
        debug!("Mock request {}", pid.elm_command());
        self.in_flight = Some((pid, self.latency_polls));
    }

    fn poll_status(&mut self) -> ElmStatus {
        if !self.connected {
            return ElmStatus::UNABLE_TO_CONNECT;
        }
        match self.in_flight.take() {
            None => ElmStatus::NO_RESPONSE,
            Some((pid, 0)) => {
                self.payload = self.generate_payload(pid);
                ElmStatus::SUCCESS
            }
            Some((pid, remaining)) => {
                self.in_flight = Some((pid, remaining - 1));
                ElmStatus::GETTING_MSG
            }
        }
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }
}
