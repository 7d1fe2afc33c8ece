//! ELM327 Adapter
//!
//! Text protocol driver for ELM327-compatible adapters. Requests are written
//! as `<mode><pid>\r` and every response ends with a `>` prompt. Reads are
//! non-blocking from the caller's point of view: each status poll drains what
//! the port has buffered and returns.

use crate::adapter::ProtocolAdapter;
use crate::pid::Pid;
use crate::status::ElmStatus;
use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Adapter setup sent after opening the port
const INIT_COMMANDS: [&str; 6] = ["ATZ", "ATE0", "ATL0", "ATS0", "ATH0", "ATSP0"];

/// Receive buffer limit for a single response
const RX_CAPACITY: usize = 128;

/// Default timeout for a single exchange
pub const DEFAULT_EXCHANGE_TIMEOUT_MS: u64 = 2000;

/// Opens the byte port an [`Elm327`] talks through
pub trait PortOpener {
    type Port: Read + Write;

    fn open(&mut self) -> io::Result<Self::Port>;
}

/// Opens a serial device
#[derive(Debug, Clone)]
pub struct SerialOpener {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    pub baud_rate: u32,
    /// Upper bound on a single read, keeps status polls short
    pub read_timeout: Duration,
}

impl SerialOpener {
    pub fn new(device: &str, baud_rate: u32) -> Self {
        Self {
            device: device.to_string(),
            baud_rate,
            read_timeout: Duration::from_millis(1),
        }
    }
}

impl PortOpener for SerialOpener {
    type Port = Box<dyn tokio_serial::SerialPort>;

    fn open(&mut self) -> io::Result<Self::Port> {
        tokio_serial::new(self.device.as_str(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(io::Error::from)
    }
}

#[derive(Debug, Clone, Copy)]
struct Exchange {
    pid: Pid,
    started: Instant,
}

/// ELM327 protocol adapter
pub struct Elm327<O: PortOpener> {
    opener: O,
    port: Option<O::Port>,
    /// Exchange timeout
    timeout: Duration,
    rx: Vec<u8>,
    exchange: Option<Exchange>,
    payload: Vec<u8>,
}

impl<O: PortOpener> Elm327<O> {
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            port: None,
            timeout: Duration::from_millis(DEFAULT_EXCHANGE_TIMEOUT_MS),
            rx: Vec::with_capacity(RX_CAPACITY),
            exchange: None,
            payload: Vec::new(),
        }
    }

    /// Set the per-exchange timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn drop_port(&mut self, reason: &io::Error) {
        if self.port.take().is_some() {
            warn!("ELM327 link lost: {}", reason);
        }
        self.exchange = None;
        self.rx.clear();
    }

    /// Read whatever the port has buffered into `rx`
    fn drain(&mut self) -> io::Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "port closed"));
        };
        let mut buf = [0u8; 64];
        match port.read(&mut buf) {
            Ok(n) => {
                self.rx.extend_from_slice(&buf[..n]);
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Take one prompt-terminated response out of `rx`, if complete
    fn take_response(&mut self) -> Option<String> {
        let end = self.rx.iter().position(|&b| b == b'>')?;
        let text = String::from_utf8_lossy(&self.rx[..end]).into_owned();
        self.rx.drain(..=end);
        Some(text)
    }

    fn send(&mut self, command: &str) -> io::Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "port closed"));
        };
        port.write_all(command.as_bytes())?;
        port.write_all(b"\r")?;
        port.flush()
    }

    /// Send a command and wait for its prompt
    fn command(&mut self, command: &str, deadline: Instant) -> io::Result<String> {
        self.send(command)?;
        loop {
            self.drain()?;
            if let Some(response) = self.take_response() {
                debug!("{} -> {:?}", command, response.trim());
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(ErrorKind::TimedOut, format!("no prompt after {}", command)));
            }
        }
    }
}

impl<O: PortOpener> ProtocolAdapter for Elm327<O> {
    fn connect(&mut self, timeout: Duration) -> bool {
        self.port = None;
        self.exchange = None;
        self.rx.clear();

        let port = match self.opener.open() {
            Ok(port) => port,
            Err(e) => {
                warn!("Failed to open ELM327 port: {}", e);
                return false;
            }
        };
        self.port = Some(port);

        let deadline = Instant::now() + timeout;
        for command in INIT_COMMANDS {
            if let Err(e) = self.command(command, deadline) {
                warn!("ELM327 initialization failed at {}: {}", command, e);
                self.port = None;
                return false;
            }
        }

        info!("ELM327 adapter initialized");
        true
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn issue(&mut self, pid: Pid) {
        self.rx.clear();
        self.exchange = Some(Exchange {
            pid,
            started: Instant::now(),
        });
        if let Err(e) = self.send(&pid.elm_command()) {
            self.drop_port(&e);
        }
    }

    fn poll_status(&mut self) -> ElmStatus {
        let Some(exchange) = self.exchange else {
            return ElmStatus::NO_RESPONSE;
        };
        if self.port.is_none() {
            self.exchange = None;
            return ElmStatus::UNABLE_TO_CONNECT;
        }
        if let Err(e) = self.drain() {
            self.drop_port(&e);
            return ElmStatus::GENERAL_ERROR;
        }

        if let Some(text) = self.take_response() {
            self.exchange = None;
            let (status, payload) = parse_response(exchange.pid, &text);
            if status == ElmStatus::SUCCESS {
                self.payload = payload;
            }
            return status;
        }
        if self.rx.len() > RX_CAPACITY {
            self.rx.clear();
            self.exchange = None;
            return ElmStatus::BUFFER_OVERFLOW;
        }
        if exchange.started.elapsed() > self.timeout {
            self.rx.clear();
            self.exchange = None;
            return ElmStatus::TIMEOUT;
        }
        ElmStatus::GETTING_MSG
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Interpret a prompt-terminated response for `pid`
pub fn parse_response(pid: Pid, text: &str) -> (ElmStatus, Vec<u8>) {
    let lines: Vec<String> = text
        .split(['\r', '\n'])
        .map(|line| line.split_whitespace().collect::<String>().to_ascii_uppercase())
        .filter(|line| !line.is_empty() && !line.starts_with("SEARCHING"))
        .collect();

    if lines.is_empty() {
        return (ElmStatus::NO_RESPONSE, Vec::new());
    }

    for line in &lines {
        let status = match line.as_str() {
            l if l.contains("NODATA") => ElmStatus::NO_DATA,
            l if l.contains("STOPPED") => ElmStatus::STOPPED,
            l if l.contains("UNABLETOCONNECT") => ElmStatus::UNABLE_TO_CONNECT,
            l if l.contains("BUFFERFULL") => ElmStatus::BUFFER_OVERFLOW,
            l if l.contains("ERROR") || l.starts_with('?') => ElmStatus::GENERAL_ERROR,
            _ => continue,
        };
        return (status, Vec::new());
    }

    let mut header = format!("{:02X}", pid.mode() + 0x40);
    if let Some(code) = pid.code() {
        header.push_str(&format!("{:02X}", code));
    }

    lines
        .iter()
        .find_map(|line| line.strip_prefix(header.as_str()))
        .and_then(decode_hex)
        .map(|payload| (ElmStatus::SUCCESS, payload))
        .unwrap_or((ElmStatus::GARBAGE, Vec::new()))
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}
