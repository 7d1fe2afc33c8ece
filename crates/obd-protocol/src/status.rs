//! Exchange Status Classification
//!
//! Adapter drivers report progress as small integer codes. This module is the
//! only place those codes are interpreted; everything above it works with
//! [`ExchangeOutcome`].

use crate::pid::{Pid, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Adapter-native exchange status, using the ELM327 driver codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElmStatus(pub i8);

impl ElmStatus {
    pub const SUCCESS: Self = Self(0);
    pub const NO_RESPONSE: Self = Self(1);
    pub const BUFFER_OVERFLOW: Self = Self(2);
    pub const GARBAGE: Self = Self(3);
    pub const UNABLE_TO_CONNECT: Self = Self(4);
    pub const NO_DATA: Self = Self(5);
    pub const STOPPED: Self = Self(6);
    pub const TIMEOUT: Self = Self(7);
    pub const GETTING_MSG: Self = Self(8);
    pub const MSG_RXD: Self = Self(9);
    pub const GENERAL_ERROR: Self = Self(-1);
}

/// Why an exchange failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NoResponse,
    Timeout,
    BufferOverflow,
    UnableToConnect,
    NoData,
    Stopped,
    GeneralError,
}

impl FailureKind {
    /// Human-readable text shown in the warning area
    pub const fn message(self) -> &'static str {
        match self {
            FailureKind::NoResponse => "No response",
            FailureKind::Timeout => "Timeout",
            FailureKind::BufferOverflow => "Buffer overflow",
            FailureKind::UnableToConnect => "Unable to connect",
            FailureKind::NoData => "No data",
            FailureKind::Stopped => "Stopped",
            FailureKind::GeneralError => "General error",
        }
    }

    /// Stable label for metrics and structured logs
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoResponse => "no-response",
            FailureKind::Timeout => "timeout",
            FailureKind::BufferOverflow => "buffer-overflow",
            FailureKind::UnableToConnect => "unable-to-connect",
            FailureKind::NoData => "no-data",
            FailureKind::Stopped => "stopped",
            FailureKind::GeneralError => "general-error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Status reduced to the closed taxonomy, before decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Pending,
    Success,
    Failure(FailureKind),
}

/// Map an adapter status onto the closed taxonomy
pub fn classify(status: ElmStatus) -> Classification {
    match status {
        ElmStatus::GETTING_MSG | ElmStatus::MSG_RXD => Classification::Pending,
        ElmStatus::SUCCESS => Classification::Success,
        ElmStatus::NO_RESPONSE => Classification::Failure(FailureKind::NoResponse),
        ElmStatus::TIMEOUT => Classification::Failure(FailureKind::Timeout),
        ElmStatus::BUFFER_OVERFLOW => Classification::Failure(FailureKind::BufferOverflow),
        ElmStatus::UNABLE_TO_CONNECT => Classification::Failure(FailureKind::UnableToConnect),
        ElmStatus::NO_DATA => Classification::Failure(FailureKind::NoData),
        ElmStatus::STOPPED => Classification::Failure(FailureKind::Stopped),
        _ => Classification::Failure(FailureKind::GeneralError),
    }
}

/// Result of one scheduler step for the in-flight exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Pending,
    Success(Value),
    Failure(FailureKind),
}

impl ExchangeOutcome {
    /// Classify a status and, on success, decode the payload.
    ///
    /// A successful status carrying a payload the decoder rejects is a
    /// general error.
    pub fn from_exchange(pid: Pid, status: ElmStatus, payload: &[u8]) -> Self {
        match classify(status) {
            Classification::Pending => ExchangeOutcome::Pending,
            Classification::Failure(kind) => ExchangeOutcome::Failure(kind),
            Classification::Success => match pid.decode(payload) {
                Ok(value) => ExchangeOutcome::Success(value),
                Err(e) => {
                    debug!("Rejecting response for {:?}: {}", pid, e);
                    ExchangeOutcome::Failure(FailureKind::GeneralError)
                }
            },
        }
    }
}
