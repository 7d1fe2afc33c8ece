//! OBD-II Error Types

use crate::pid::Pid;
use thiserror::Error;

/// Errors raised while decoding OBD-II responses
#[derive(Debug, Error)]
pub enum ObdError {
    /// Payload length does not match what the PID encodes
    #[error("PID {pid} payload has {actual} bytes, expected {expected}")]
    PayloadLength {
        pid: Pid,
        expected: usize,
        actual: usize,
    },
}
