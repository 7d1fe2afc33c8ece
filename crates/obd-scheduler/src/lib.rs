//! OBD-II Polling Scheduler
//!
//! Single-flight, cooperative polling of a fixed parameter table. Values
//! are routed to the dashboard widgets and the trip log; the fuel trim
//! chart only advances once every trim has refreshed.

mod chart;
mod config;
mod display;
mod registry;
mod runner;
mod scheduler;

#[cfg(test)]
mod testing;

pub use chart::ChartAggregator;
pub use config::SchedulerConfig;
pub use display::{DisplaySink, WarningMode};
pub use registry::{default_tasks, ParameterTask, TaskRegistry, TaskSpec, MAX_NAME_LEN};
pub use runner::{LoopState, MonotonicClock, Runner, CONNECTING_MESSAGE};
pub use scheduler::{Scheduler, TickOutcome, QUEUE_FULL_WARNING};

use thiserror::Error;

/// Invalid task table
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task table is empty")]
    EmptyTable,

    #[error("Invalid task name {0:?}: must be 1 to 9 characters")]
    InvalidName(String),

    #[error("Duplicate task name: {0}")]
    DuplicateName(String),

    #[error("Task {0} has a zero polling interval")]
    ZeroInterval(String),
}
