//! PID Scheduler Implementation
//!
//! Cooperative, single-flight scheduler. Each call to [`Scheduler::tick`]
//! does one step of work and returns without blocking: either it advances
//! the one in-flight exchange or it starts the most overdue task.

use crate::chart::ChartAggregator;
use crate::config::SchedulerConfig;
use crate::display::{DisplaySink, WarningMode};
use crate::registry::TaskRegistry;
use obd_protocol::{ExchangeOutcome, FailureKind, Pid, ProtocolAdapter, Value};
use tracing::{debug, info, warn};
use trip_log::{LogEntry, LogError, LogProducer};

/// Warning shown when a log entry had to be dropped
pub const QUEUE_FULL_WARNING: &str = "log queue full";

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Waiting out the pause that follows a failure
    Paused,
    /// Nothing in flight and nothing due
    Idle,
    /// Request sent for the task at this index
    Issued { task: usize },
    /// In-flight exchange still running
    Pending { task: usize },
    Completed { task: usize, value: Value },
    Failed { task: usize, kind: FailureKind },
}

/// Single-flight PID scheduler
pub struct Scheduler {
    registry: TaskRegistry,
    /// Index of the task whose exchange is outstanding
    in_flight: Option<usize>,
    chart: Option<ChartAggregator>,
    log: LogProducer,
    config: SchedulerConfig,
    paused_until: Option<u64>,
}

impl Scheduler {
    /// Create a scheduler over `registry`, logging values to `log`
    pub fn new(registry: TaskRegistry, log: LogProducer, config: SchedulerConfig) -> Self {
        let chart = ChartAggregator::fuel_trim(&registry);
        if chart.is_none() {
            info!("Fuel trim chart disabled: not all trims are polled");
        }
        info!("PID scheduler created with {} parameters", registry.len());

        Self {
            registry,
            in_flight: None,
            chart,
            log,
            config,
            paused_until: None,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    pub fn chart(&self) -> Option<&ChartAggregator> {
        self.chart.as_ref()
    }

    /// Advance one step of cooperative work
    pub fn tick<A, D>(&mut self, now: u64, adapter: &mut A, display: &mut D) -> TickOutcome
    where
        A: ProtocolAdapter,
        D: DisplaySink,
    {
        if let Some(index) = self.in_flight {
            return self.advance(index, now, adapter, display);
        }

        if let Some(until) = self.paused_until {
            if now < until {
                return TickOutcome::Paused;
            }
            self.paused_until = None;
        }

        let Some(index) = self.registry.most_overdue(now) else {
            return TickOutcome::Idle;
        };
        let Some(task) = self.registry.get(index) else {
            return TickOutcome::Idle;
        };

        debug!("Polling {} ({})", task.name(), task.pid().elm_command());
        self.in_flight = Some(index);
        adapter.issue(task.pid());
        TickOutcome::Issued { task: index }
    }

    fn advance<A, D>(&mut self, index: usize, now: u64, adapter: &mut A, display: &mut D) -> TickOutcome
    where
        A: ProtocolAdapter,
        D: DisplaySink,
    {
        let Some(pid) = self.registry.get(index).map(|task| task.pid()) else {
            self.in_flight = None;
            return TickOutcome::Idle;
        };

        let status = adapter.poll_status();
        match ExchangeOutcome::from_exchange(pid, status, adapter.payload()) {
            ExchangeOutcome::Pending => TickOutcome::Pending { task: index },
            ExchangeOutcome::Success(value) => {
                self.in_flight = None;
                self.complete(index, now, value, display)
            }
            ExchangeOutcome::Failure(kind) => {
                self.in_flight = None;
                self.fail(index, now, kind, display)
            }
        }
    }

    fn complete<D: DisplaySink>(&mut self, index: usize, now: u64, value: Value, display: &mut D) -> TickOutcome {
        metrics::counter!("obd_exchanges_total", "outcome" => "success").increment(1);
        self.registry.record_success(index, now, value.clone());

        if let Some(task) = self.registry.get(index) {
            let text = value.to_string();
            debug!("{} = {}", task.name(), text);
            publish(display, task.name(), task.pid(), &value, &text);

            match self.log.enqueue(LogEntry::new(now, task.name(), &text)) {
                Ok(()) => {}
                Err(LogError::QueueFull) => display.set_warning(QUEUE_FULL_WARNING, WarningMode::Replace),
                Err(e) => debug!("Value not logged: {}", e),
            }
        }

        if let Some(chart) = self.chart.as_mut() {
            chart.on_success(index, &self.registry, now, display);
        }

        TickOutcome::Completed { task: index, value }
    }

    fn fail<D: DisplaySink>(&mut self, index: usize, now: u64, kind: FailureKind, display: &mut D) -> TickOutcome {
        metrics::counter!("obd_exchanges_total", "outcome" => kind.as_str()).increment(1);

        // Failing tasks wait out their own cadence before the next attempt
        self.registry.record_failure(index, now);

        if let Some(task) = self.registry.get(index) {
            warn!("PID {} ({}) failed: {}", task.pid().elm_command(), task.name(), kind);
            display.set_warning(&format!("{}: {}", task.name(), kind.message()), WarningMode::Replace);
        }

        if self.config.failure_pause_ms > 0 {
            self.paused_until = Some(now.saturating_add(self.config.failure_pause_ms));
        }

        TickOutcome::Failed { task: index, kind }
    }
}

/// Route a fresh value to the widgets
fn publish<D: DisplaySink>(display: &mut D, name: &str, pid: Pid, value: &Value, text: &str) {
    if pid == Pid::Speed {
        if let Some(speed) = value.as_i64() {
            display.set_gauge(speed);
        }
    }

    display.set_label(name, text);

    if let Value::Text(codes) = value {
        if pid == Pid::StoredDtcs && !codes.is_empty() {
            display.set_warning(&format!("DTC: {}", codes), WarningMode::Replace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{default_tasks, TaskSpec};
    use crate::testing::{RecordingDisplay, ScriptedAdapter};
    use obd_protocol::{ElmStatus, MockAdapter};
    use proptest::prelude::*;
    use std::time::Duration;
    use trip_log::{log_channel, LogReceiver};

    fn scheduler(specs: Vec<TaskSpec>, failure_pause_ms: u64) -> (Scheduler, LogReceiver) {
        let (producer, receiver) = log_channel(1000);
        let config = SchedulerConfig {
            failure_pause_ms,
            ..Default::default()
        };
        let registry = TaskRegistry::new(specs).unwrap();
        (Scheduler::new(registry, producer, config), receiver)
    }

    #[test]
    fn test_idle_until_due() {
        let (mut scheduler, _rx) = scheduler(default_tasks(), 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();

        assert_eq!(scheduler.tick(10, &mut adapter, &mut display), TickOutcome::Idle);
        assert!(adapter.issued.is_empty());
        assert_eq!(scheduler.in_flight(), None);
    }

    #[test]
    fn test_success_updates_everything() {
        let (mut scheduler, mut rx) = scheduler(default_tasks(), 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter
            .push(ElmStatus::GETTING_MSG, &[])
            .push(ElmStatus::SUCCESS, &[0x55]);

        assert_eq!(
            scheduler.tick(50, &mut adapter, &mut display),
            TickOutcome::Issued { task: 0 }
        );
        assert_eq!(adapter.issued, vec![Pid::Speed]);
        assert_eq!(scheduler.in_flight(), Some(0));

        assert_eq!(
            scheduler.tick(51, &mut adapter, &mut display),
            TickOutcome::Pending { task: 0 }
        );
        assert_eq!(scheduler.in_flight(), Some(0));

        assert_eq!(
            scheduler.tick(52, &mut adapter, &mut display),
            TickOutcome::Completed {
                task: 0,
                value: Value::Integer(85)
            }
        );
        assert_eq!(scheduler.in_flight(), None);
        assert_eq!(scheduler.registry().get(0).unwrap().last_run(), Some(52));
        assert_eq!(display.gauge, Some(85));
        assert_eq!(display.labels.get("kph").map(String::as_str), Some("85"));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry, LogEntry::new(52, "kph", "85"));
    }

    #[test]
    fn test_next_task_after_completion() {
        let (mut scheduler, _rx) = scheduler(default_tasks(), 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter.push(ElmStatus::SUCCESS, &[0x10]);

        scheduler.tick(50, &mut adapter, &mut display);
        scheduler.tick(51, &mut adapter, &mut display);
        // kph just ran; rpm is now the most overdue
        assert_eq!(
            scheduler.tick(52, &mut adapter, &mut display),
            TickOutcome::Issued { task: 1 }
        );
        assert_eq!(adapter.issued, vec![Pid::Speed, Pid::Rpm]);
    }

    #[test]
    fn test_failure_applies_cooldown_and_pause() {
        let specs = vec![
            TaskSpec::new("stft1", Pid::ShortFuelTrimBank1, 100),
            TaskSpec::new("kph", Pid::Speed, 100),
        ];
        let (mut scheduler, mut rx) = scheduler(specs, 20);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter.push(ElmStatus::NO_DATA, &[]);

        scheduler.tick(100, &mut adapter, &mut display);
        assert_eq!(
            scheduler.tick(101, &mut adapter, &mut display),
            TickOutcome::Failed {
                task: 0,
                kind: FailureKind::NoData
            }
        );
        assert_eq!(display.last_warning(), Some("stft1: No data"));
        assert_eq!(scheduler.registry().get(0).unwrap().last_run(), Some(101));
        assert!(scheduler.registry().get(0).unwrap().last_value().is_none());
        assert!(rx.try_recv().is_err());

        assert_eq!(scheduler.tick(110, &mut adapter, &mut display), TickOutcome::Paused);
        assert_eq!(
            scheduler.tick(121, &mut adapter, &mut display),
            TickOutcome::Issued { task: 1 }
        );
    }

    #[test]
    fn test_failed_task_waits_for_its_cadence() {
        let specs = vec![TaskSpec::new("rpm", Pid::Rpm, 50)];
        let (mut scheduler, _rx) = scheduler(specs, 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter.push(ElmStatus::TIMEOUT, &[]);

        scheduler.tick(50, &mut adapter, &mut display);
        scheduler.tick(60, &mut adapter, &mut display);
        assert_eq!(scheduler.tick(61, &mut adapter, &mut display), TickOutcome::Idle);
        assert_eq!(scheduler.tick(109, &mut adapter, &mut display), TickOutcome::Idle);
        assert_eq!(
            scheduler.tick(110, &mut adapter, &mut display),
            TickOutcome::Issued { task: 0 }
        );
    }

    #[test]
    fn test_malformed_payload_is_general_error() {
        let specs = vec![TaskSpec::new("rpm", Pid::Rpm, 50)];
        let (mut scheduler, _rx) = scheduler(specs, 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter.push(ElmStatus::SUCCESS, &[0x1A]);

        scheduler.tick(50, &mut adapter, &mut display);
        assert_eq!(
            scheduler.tick(51, &mut adapter, &mut display),
            TickOutcome::Failed {
                task: 0,
                kind: FailureKind::GeneralError
            }
        );
        assert_eq!(display.last_warning(), Some("rpm: General error"));
    }

    #[test]
    fn test_queue_full_warns_once_per_drop() {
        let specs = vec![TaskSpec::new("kph", Pid::Speed, 10)];
        let registry = TaskRegistry::new(specs).unwrap();
        let (producer, _rx) = log_channel(1);
        let mut scheduler = Scheduler::new(registry, producer.clone(), SchedulerConfig::default());
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter
            .push(ElmStatus::SUCCESS, &[1])
            .push(ElmStatus::SUCCESS, &[2])
            .push(ElmStatus::SUCCESS, &[3]);

        let mut now = 10;
        for _ in 0..3 {
            scheduler.tick(now, &mut adapter, &mut display);
            scheduler.tick(now + 1, &mut adapter, &mut display);
            now += 20;
        }

        let drops = display
            .warnings
            .iter()
            .filter(|(text, _)| text == QUEUE_FULL_WARNING)
            .count();
        assert_eq!(drops, 2);
        assert_eq!(producer.dropped(), 2);
    }

    #[test]
    fn test_fuel_trim_chart_through_scheduler() {
        let specs = vec![
            TaskSpec::new("stft1", Pid::ShortFuelTrimBank1, 50),
            TaskSpec::new("stft2", Pid::ShortFuelTrimBank2, 50),
            TaskSpec::new("ltft1", Pid::LongFuelTrimBank1, 50),
            TaskSpec::new("ltft2", Pid::LongFuelTrimBank2, 50),
        ];
        let (mut scheduler, _rx) = scheduler(specs, 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        // 1.28*A - 100 for A = 80, 90, 100, 110
        for byte in [80u8, 90, 100, 110] {
            adapter.push(ElmStatus::SUCCESS, &[byte]);
        }

        let mut now = 50;
        for _ in 0..4 {
            scheduler.tick(now, &mut adapter, &mut display);
            scheduler.tick(now + 1, &mut adapter, &mut display);
            now += 2;
        }

        assert_eq!(display.chart_points.len(), 1);
        let (bank1, bank2) = display.chart_points[0];
        // stft1 (80) + ltft1 (100); stft2 (90) + ltft2 (110)
        assert!((bank1 - (2.4 + 28.0)).abs() < 1e-6);
        assert!((bank2 - (15.2 + 40.8)).abs() < 1e-6);
        assert_eq!(scheduler.chart().unwrap().watermark(), 57);
    }

    #[test]
    fn test_dtc_codes_raise_warning() {
        let specs = vec![TaskSpec::new("dtc", Pid::StoredDtcs, 5000)];
        let (mut scheduler, _rx) = scheduler(specs, 0);
        let mut adapter = ScriptedAdapter::connected();
        let mut display = RecordingDisplay::default();
        adapter.push(ElmStatus::SUCCESS, &[0x01, 0x01, 0x33]);

        scheduler.tick(5000, &mut adapter, &mut display);
        scheduler.tick(5001, &mut adapter, &mut display);
        assert_eq!(display.labels.get("dtc").map(String::as_str), Some("P0133"));
        assert_eq!(display.last_warning(), Some("DTC: P0133"));
    }

    const PIDS: [Pid; 4] = [Pid::Speed, Pid::Rpm, Pid::ShortFuelTrimBank1, Pid::StoredDtcs];

    fn status_strategy() -> impl Strategy<Value = ElmStatus> {
        prop_oneof![
            Just(ElmStatus::GETTING_MSG),
            Just(ElmStatus::SUCCESS),
            Just(ElmStatus::NO_DATA),
            Just(ElmStatus::TIMEOUT),
            Just(ElmStatus::GARBAGE),
            (-5i8..12).prop_map(ElmStatus),
        ]
    }

    proptest! {
        #[test]
        fn prop_single_flight(
            intervals in proptest::collection::vec(1u64..40, 1..6),
            statuses in proptest::collection::vec(status_strategy(), 0..300),
        ) {
            let specs = intervals
                .iter()
                .enumerate()
                .map(|(i, interval)| TaskSpec::new(&format!("t{}", i), PIDS[i % PIDS.len()], *interval))
                .collect();
            let (mut scheduler, _rx) = scheduler(specs, 3);
            let mut adapter = ScriptedAdapter::connected();
            let mut display = RecordingDisplay::default();
            for status in statuses {
                adapter.push(status, &[0x40]);
            }

            for now in 0..400u64 {
                let before = scheduler.in_flight();
                let outcome = scheduler.tick(now, &mut adapter, &mut display);
                match outcome {
                    TickOutcome::Issued { task } => {
                        prop_assert_eq!(before, None);
                        prop_assert_eq!(scheduler.in_flight(), Some(task));
                    }
                    TickOutcome::Pending { task } => prop_assert_eq!(scheduler.in_flight(), Some(task)),
                    _ => prop_assert_eq!(scheduler.in_flight(), None),
                }
            }
        }

        #[test]
        fn prop_wait_is_bounded(intervals in proptest::collection::vec(5u64..200, 1..7)) {
            let n = intervals.len() as u64;
            let specs = intervals
                .iter()
                .enumerate()
                .map(|(i, interval)| TaskSpec::new(&format!("t{}", i), PIDS[i % PIDS.len()], *interval))
                .collect();
            let (mut scheduler, _rx) = scheduler(specs, 0);
            let mut adapter = MockAdapter::new(1);
            prop_assert!(adapter.connect(Duration::ZERO));
            let mut display = RecordingDisplay::default();

            let mut last_success: Vec<Option<u64>> = vec![None; intervals.len()];
            for now in 0..4000u64 {
                if let TickOutcome::Completed { task, .. } = scheduler.tick(now, &mut adapter, &mut display) {
                    if let Some(previous) = last_success[task] {
                        // Each exchange takes three ticks; at most one per competing task can go first
                        prop_assert!(now - previous <= intervals[task] + 3 * (n + 1));
                    }
                    last_success[task] = Some(now);
                }
            }
            prop_assert!(last_success.iter().all(Option::is_some));
        }
    }
}
