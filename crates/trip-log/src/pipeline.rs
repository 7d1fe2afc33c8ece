//! Log Pipeline
//!
//! Bounded producer/consumer queue between the polling loop and the
//! persistent writer. Entries leave the queue in the order they were
//! enqueued.

use crate::entry::LogEntry;
use crate::sink::PersistentSink;
use crate::LogError;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// Default queue capacity in entries
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of entries per persistent append
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Consumer end of the log queue
pub type LogReceiver = mpsc::Receiver<LogEntry>;

/// Create a bounded log queue holding at most `capacity` entries
pub fn log_channel(capacity: usize) -> (LogProducer, LogReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let producer = LogProducer {
        sender,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (producer, receiver)
}

/// Non-blocking producer end of the log queue
#[derive(Debug, Clone)]
pub struct LogProducer {
    sender: mpsc::Sender<LogEntry>,
    dropped: Arc<AtomicU64>,
}

impl LogProducer {
    /// Queue an entry without blocking. A full queue drops the entry.
    pub fn enqueue(&self, entry: LogEntry) -> Result<(), LogError> {
        match self.sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("trip_log_dropped_total").increment(1);
                warn!("Log queue full, dropping {} entry", entry.name);
                Err(LogError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(LogError::WriterStopped),
        }
    }

    /// Entries dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

type ErrorHook = Box<dyn FnMut(&LogError) + Send>;

/// Background consumer that batches entries into the persistent sink
pub struct LogWriter<S> {
    receiver: LogReceiver,
    sink: S,
    batch_size: usize,
    buffer: String,
    buffered: usize,
    on_error: Option<ErrorHook>,
}

impl<S: PersistentSink> LogWriter<S> {
    pub fn new(receiver: LogReceiver, sink: S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        info!("Creating log writer: batch_size={}", batch_size);
        Self {
            receiver,
            sink,
            batch_size,
            buffer: String::new(),
            buffered: 0,
            on_error: None,
        }
    }

    /// Report append failures through `hook` (e.g. to the warning display)
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&LogError) + Send + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Fold one entry into the batch, appending once the batch is full
    pub fn accept(&mut self, entry: LogEntry) {
        self.buffer.push_str(&entry.line());
        self.buffered += 1;
        if self.buffered >= self.batch_size {
            self.flush();
        }
    }

    /// Entries waiting in the batch buffer
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Append the current batch. On failure the batch is discarded.
    pub fn flush(&mut self) {
        if self.buffered == 0 {
            return;
        }

        match self.sink.append_batch(&self.buffer) {
            Ok(()) => {
                debug!("Appended batch of {} log entries", self.buffered);
                metrics::counter!("trip_log_batches_total", "result" => "ok").increment(1);
            }
            Err(e) => {
                error!("Discarding {} log entries: {}", self.buffered, e);
                metrics::counter!("trip_log_batches_total", "result" => "error").increment(1);
                if let Some(hook) = self.on_error.as_mut() {
                    hook(&e);
                }
            }
        }
        self.buffer.clear();
        self.buffered = 0;
    }

    /// Consume until every producer is gone, then flush what is left.
    ///
    /// Blocks the calling thread while the queue is empty; must not be
    /// called from inside an async runtime.
    pub fn run(mut self) -> S {
        info!("Starting log writer");
        while let Some(entry) = self.receiver.blocking_recv() {
            self.accept(entry);
        }
        self.flush();
        info!("Log writer stopped");
        self.sink
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> io::Result<JoinHandle<S>>
    where
        S: Send + 'static,
    {
        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || self.run())
    }
}
