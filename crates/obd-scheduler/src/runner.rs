//! Connection Runner
//!
//! Drives the scheduler from the outer loop. While the adapter link is down
//! no parameter is polled; each iteration makes one connect attempt instead,
//! with no backoff and no retry limit.

use crate::display::{DisplaySink, WarningMode};
use crate::scheduler::{Scheduler, TickOutcome};
use obd_protocol::ProtocolAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Warning shown while the adapter link is down
pub const CONNECTING_MESSAGE: &str = "Connecting to OBD adapter...";

/// What one loop iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Link down; `attempt` counts failed attempts since it was lost
    Connecting { attempt: u32 },
    Running(TickOutcome),
}

/// Milliseconds elapsed since creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the adapter, display and scheduler for the polling loop
pub struct Runner<A, D> {
    adapter: A,
    display: D,
    scheduler: Scheduler,
    connect_timeout: Duration,
    connected: bool,
    attempts: u32,
}

impl<A: ProtocolAdapter, D: DisplaySink> Runner<A, D> {
    pub fn new(adapter: A, display: D, scheduler: Scheduler, connect_timeout: Duration) -> Self {
        Self {
            adapter,
            display,
            scheduler,
            connect_timeout,
            connected: false,
            attempts: 0,
        }
    }

    /// One loop iteration
    pub fn step(&mut self, now: u64) -> LoopState {
        if self.connected && !self.adapter.is_connected() {
            warn!("Lost connection to OBD adapter");
            self.connected = false;
            self.attempts = 0;
        }

        if !self.connected {
            self.display.set_warning(CONNECTING_MESSAGE, WarningMode::Replace);
            if !self.adapter.connect(self.connect_timeout) {
                self.attempts += 1;
                metrics::counter!("obd_connect_attempts_total", "result" => "failed").increment(1);
                self.display.refresh();
                return LoopState::Connecting { attempt: self.attempts };
            }

            metrics::counter!("obd_connect_attempts_total", "result" => "ok").increment(1);
            info!("Connected to OBD adapter after {} failed attempts", self.attempts);
            self.connected = true;
            self.attempts = 0;
            self.display.set_warning("", WarningMode::Replace);
        }

        self.display.refresh();
        LoopState::Running(self.scheduler.tick(now, &mut self.adapter, &mut self.display))
    }

    /// Step every `loop_interval` until `shutdown` is set
    pub fn run(&mut self, clock: &MonotonicClock, shutdown: &AtomicBool, loop_interval: Duration) {
        info!("Starting polling loop");
        while !shutdown.load(Ordering::Relaxed) {
            self.step(clock.now_ms());
            thread::sleep(loop_interval);
        }
        info!("Polling loop stopped");
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}
