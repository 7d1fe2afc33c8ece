//! OBD-II Dashboard - Main Entry Point

use anyhow::{anyhow, Context, Result};
use dashboard::{build_runner, init_logging, start_trip_log, Settings, TerminalDisplay};
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_scheduler::MonotonicClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(settings.log_format)?;

    info!("=== OBD-II Dashboard v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = settings.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Serving metrics on {}", addr);
    }

    let trip = start_trip_log(&settings.log)?;
    let display = TerminalDisplay::new().with_alerts(trip.alerts);
    let mut runner = build_runner(&settings, trip.producer, display)?;
    let writer = trip.writer;

    let shutdown = Arc::new(AtomicBool::new(false));
    let loop_interval = Duration::from_millis(settings.loop_interval_ms);
    let polling = {
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || {
            runner.run(&MonotonicClock::new(), &shutdown, loop_interval);
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutting down...");
    shutdown.store(true, Ordering::Relaxed);

    // The runner owns the last producer; once it is gone the writer flushes and exits
    polling.await.context("Polling loop panicked")?;
    let sink = tokio::task::spawn_blocking(move || writer.join())
        .await
        .context("Failed to join log writer")?
        .map_err(|_| anyhow!("Log writer panicked"))?;

    info!("Trip log saved to {}", sink.path().display());
    Ok(())
}
