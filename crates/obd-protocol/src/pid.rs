//! OBD-II PID Definitions and Response Decoding
//!
//! Defines the parameters the dashboard can poll and the formula that turns
//! each response payload into an engineering value. Decoding is pure: the
//! same bytes for the same PID always give the same value.

use crate::dtc;
use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters that can be requested from the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pid {
    /// Vehicle speed (0x0D)
    Speed,
    /// Engine RPM (0x0C)
    Rpm,
    /// Short-term fuel trim bank 1 (0x06)
    ShortFuelTrimBank1,
    /// Long-term fuel trim bank 1 (0x07)
    LongFuelTrimBank1,
    /// Short-term fuel trim bank 2 (0x08)
    ShortFuelTrimBank2,
    /// Long-term fuel trim bank 2 (0x09)
    LongFuelTrimBank2,
    /// Engine coolant temperature (0x05)
    CoolantTemp,
    /// Calculated engine load (0x04)
    EngineLoad,
    /// Mass air flow rate (0x10)
    Maf,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure,
    /// Throttle position (0x11)
    ThrottlePosition,
    /// Stored diagnostic trouble codes (mode 03)
    StoredDtcs,
}

impl Pid {
    /// Service mode the request is sent with
    pub fn mode(&self) -> u8 {
        match self {
            Pid::StoredDtcs => crate::mode::READ_DTC,
            _ => crate::mode::CURRENT_DATA,
        }
    }

    /// PID byte, `None` for services that take no PID
    pub fn code(&self) -> Option<u8> {
        let code = match self {
            Pid::Speed => 0x0D,
            Pid::Rpm => 0x0C,
            Pid::ShortFuelTrimBank1 => 0x06,
            Pid::LongFuelTrimBank1 => 0x07,
            Pid::ShortFuelTrimBank2 => 0x08,
            Pid::LongFuelTrimBank2 => 0x09,
            Pid::CoolantTemp => 0x05,
            Pid::EngineLoad => 0x04,
            Pid::Maf => 0x10,
            Pid::IntakeManifoldPressure => 0x0B,
            Pid::ThrottlePosition => 0x11,
            Pid::StoredDtcs => return None,
        };
        Some(code)
    }

    /// ELM327 request string, e.g. `010D` or `03`
    pub fn elm_command(&self) -> String {
        match self.code() {
            Some(code) => format!("{:02X}{:02X}", self.mode(), code),
            None => format!("{:02X}", self.mode()),
        }
    }

    /// Number of payload bytes a well-formed response carries, `None` if variable
    pub fn response_bytes(&self) -> Option<usize> {
        match self {
            Pid::Rpm | Pid::Maf => Some(2),
            Pid::StoredDtcs => None,
            _ => Some(1),
        }
    }

    /// Check a payload length against what this PID expects
    pub fn accepts_len(&self, len: usize) -> bool {
        match self.response_bytes() {
            Some(expected) => len == expected,
            // Pairs of DTC bytes, optionally preceded by a count byte
            None => true,
        }
    }

    /// Whether the value is a fuel trim percentage
    pub fn is_fuel_trim(&self) -> bool {
        matches!(
            self,
            Pid::ShortFuelTrimBank1
                | Pid::LongFuelTrimBank1
                | Pid::ShortFuelTrimBank2
                | Pid::LongFuelTrimBank2
        )
    }

    /// Decode a response payload into an engineering value
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, ObdError> {
        if !self.accepts_len(bytes.len()) {
            return Err(ObdError::PayloadLength {
                pid: *self,
                expected: self.response_bytes().unwrap_or(0),
                actual: bytes.len(),
            });
        }

        let a = bytes.first().copied().map(f64::from).unwrap_or(0.0);
        let value = match self {
            // Speed: A (km/h)
            Pid::Speed => Value::Integer(i64::from(bytes[0])),
            // RPM: ((A*256)+B)/4
            Pid::Rpm => Value::Number((a * 256.0 + f64::from(bytes[1])) / 4.0),
            // Fuel trims: 1.28*A - 100 (%)
            Pid::ShortFuelTrimBank1
            | Pid::LongFuelTrimBank1
            | Pid::ShortFuelTrimBank2
            | Pid::LongFuelTrimBank2 => Value::Number(1.28 * a - 100.0),
            // Coolant Temp: A - 40 (°C)
            Pid::CoolantTemp => Value::Integer(i64::from(bytes[0]) - 40),
            // Engine load / throttle: A * 100 / 255 (%)
            Pid::EngineLoad | Pid::ThrottlePosition => Value::Number(a * 100.0 / 255.0),
            // MAF: ((A*256)+B) / 100 (g/s)
            Pid::Maf => Value::Number((a * 256.0 + f64::from(bytes[1])) / 100.0),
            // Intake manifold pressure: A (kPa)
            Pid::IntakeManifoldPressure => Value::Integer(i64::from(bytes[0])),
            Pid::StoredDtcs => Value::Text(dtc::decode_codes(bytes).join(" ")),
        };
        Ok(value)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.elm_command())
    }
}

/// A decoded engineering value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// Integer view, truncating toward zero like a gauge would
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Number(v) => Some(*v as i64),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{:.2}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}
