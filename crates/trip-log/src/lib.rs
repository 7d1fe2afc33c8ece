//! Trip Log
//!
//! Carries polled values from the scheduler to persistent storage. The
//! producer side never blocks: when the bounded queue is full the entry is
//! dropped. A background writer batches entries and appends them in bulk.

mod entry;
mod pipeline;
mod sink;

pub use entry::{LogEntry, FIELD_WIDTH};
pub use pipeline::{
    log_channel, LogProducer, LogReceiver, LogWriter, DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY,
};
pub use sink::{FileSink, PersistentSink};

use thiserror::Error;

/// Log pipeline errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log queue full, entry dropped")]
    QueueFull,
    #[error("Log writer stopped")]
    WriterStopped,
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),
}
