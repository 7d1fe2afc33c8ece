//! OBD-II Dashboard
//!
//! Wires the adapter, scheduler, trip log and terminal display together.

mod display;
mod settings;

pub use display::{TerminalDisplay, MAX_WARNING_CHARS};
pub use settings::{AdapterKind, AdapterSettings, LogFormat, LogSettings, Settings, DEFAULT_CONFIG, ENV_PREFIX};

use anyhow::{Context, Result};
use obd_protocol::{Elm327, ElmStatus, MockAdapter, Pid, ProtocolAdapter, SerialOpener};
use obd_scheduler::{Runner, Scheduler, TaskRegistry};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use trip_log::{log_channel, FileSink, LogProducer, LogWriter};

/// The adapter selected by configuration
pub enum DashAdapter {
    Mock(MockAdapter),
    Serial(Elm327<SerialOpener>),
}

impl DashAdapter {
    pub fn from_settings(settings: &AdapterSettings) -> Self {
        match settings.kind {
            AdapterKind::Mock => DashAdapter::Mock(MockAdapter::new(settings.mock_latency_polls)),
            AdapterKind::Serial => {
                info!("Using ELM327 on {} at {} baud", settings.device, settings.baud_rate);
                let mut adapter = Elm327::new(SerialOpener::new(&settings.device, settings.baud_rate));
                adapter.set_timeout(Duration::from_millis(settings.timeout_ms));
                DashAdapter::Serial(adapter)
            }
        }
    }
}

impl ProtocolAdapter for DashAdapter {
    fn connect(&mut self, timeout: Duration) -> bool {
        match self {
            DashAdapter::Mock(adapter) => adapter.connect(timeout),
            DashAdapter::Serial(adapter) => adapter.connect(timeout),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            DashAdapter::Mock(adapter) => adapter.is_connected(),
            DashAdapter::Serial(adapter) => adapter.is_connected(),
        }
    }

    fn issue(&mut self, pid: Pid) {
        match self {
            DashAdapter::Mock(adapter) => adapter.issue(pid),
            DashAdapter::Serial(adapter) => adapter.issue(pid),
        }
    }

    fn poll_status(&mut self) -> ElmStatus {
        match self {
            DashAdapter::Mock(adapter) => adapter.poll_status(),
            DashAdapter::Serial(adapter) => adapter.poll_status(),
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            DashAdapter::Mock(adapter) => adapter.payload(),
            DashAdapter::Serial(adapter) => adapter.payload(),
        }
    }
}

/// Initialize logging
pub fn init_logging(format: LogFormat) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    installed.context("Failed to set tracing subscriber")
}

/// Writer failures waiting to be shown; further ones are dropped
const ALERT_CAPACITY: usize = 8;

/// A running trip log
pub struct TripLog {
    pub producer: LogProducer,
    /// Append failures reported by the writer thread
    pub alerts: mpsc::Receiver<String>,
    pub writer: JoinHandle<FileSink>,
}

/// Create the next trip log and start its writer thread
pub fn start_trip_log(settings: &LogSettings) -> Result<TripLog> {
    let sink = FileSink::create_next(&settings.dir)
        .with_context(|| format!("Failed to create trip log in {}", settings.dir.display()))?;
    let (producer, receiver) = log_channel(settings.queue_capacity);
    let (alert_tx, alerts) = mpsc::channel(ALERT_CAPACITY);

    let writer = LogWriter::new(receiver, sink, settings.batch_size).on_error(move |e| {
        if alert_tx.try_send(format!("Log write failed: {}. ", e)).is_err() {
            debug!("Log write failure not shown: alert queue full");
        }
    });
    let writer = writer.spawn().context("Failed to start log writer")?;

    Ok(TripLog {
        producer,
        alerts,
        writer,
    })
}

/// Build the polling loop from settings
pub fn build_runner(
    settings: &Settings,
    log: LogProducer,
    display: TerminalDisplay,
) -> Result<Runner<DashAdapter, TerminalDisplay>> {
    let registry = TaskRegistry::new(settings.tasks.clone()).context("Invalid task table")?;
    let scheduler = Scheduler::new(registry, log, settings.scheduler.clone());
    let adapter = DashAdapter::from_settings(&settings.adapter);

    Ok(Runner::new(
        adapter,
        display,
        scheduler,
        settings.scheduler.connect_timeout(),
    ))
}
