//! OBD-II Protocol Implementation
//!
//! Parameter decoding, exchange status classification and the adapters that
//! talk to ELM327-compatible hardware over a half-duplex serial link.

mod adapter;
mod dtc;
mod elm;
mod error;
mod pid;
mod status;

pub use adapter::{MockAdapter, ProtocolAdapter};
pub use dtc::{decode_codes, format_code};
pub use elm::{parse_response, Elm327, PortOpener, SerialOpener, DEFAULT_EXCHANGE_TIMEOUT_MS};
pub use error::ObdError;
pub use pid::{Pid, Value};
pub use status::{classify, Classification, ElmStatus, ExchangeOutcome, FailureKind};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
}
