//! Task Registry
//!
//! Fixed, ordered table of pollable parameters. Tasks are addressed by index
//! for the lifetime of the process.

use crate::SchedulerError;
use obd_protocol::{Pid, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Longest allowed task name
pub const MAX_NAME_LEN: usize = 9;

/// Configuration entry for one polled parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub pid: Pid,
    /// Minimum interval between polls
    pub interval_ms: u64,
}

impl TaskSpec {
    pub fn new(name: &str, pid: Pid, interval_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            pid,
            interval_ms,
        }
    }
}

/// The dashboard's standard table
pub fn default_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("kph", Pid::Speed, 50),
        TaskSpec::new("rpm", Pid::Rpm, 50),
        TaskSpec::new("stft1", Pid::ShortFuelTrimBank1, 50),
        TaskSpec::new("stft2", Pid::ShortFuelTrimBank2, 50),
        TaskSpec::new("ltft1", Pid::LongFuelTrimBank1, 50),
        TaskSpec::new("ltft2", Pid::LongFuelTrimBank2, 50),
        TaskSpec::new("dtc", Pid::StoredDtcs, 5000),
    ]
}

/// A registered parameter and its polling state
#[derive(Debug, Clone)]
pub struct ParameterTask {
    name: String,
    pid: Pid,
    interval_ms: u64,
    /// Time of the last terminal outcome, success or failure
    last_run: Option<u64>,
    /// Latest successfully decoded value
    last_value: Option<Value>,
}

impl ParameterTask {
    fn new(spec: TaskSpec) -> Self {
        Self {
            name: spec.name,
            pid: spec.pid,
            interval_ms: spec.interval_ms,
            last_run: None,
            last_value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn last_run(&self) -> Option<u64> {
        self.last_run
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    /// Earliest time the task may be polled again
    pub fn due_at(&self) -> u64 {
        self.last_run.unwrap_or(0).saturating_add(self.interval_ms)
    }

    /// How long past due the task is at `now`, `None` if not yet due
    pub fn overdue(&self, now: u64) -> Option<u64> {
        now.checked_sub(self.due_at())
    }

    fn mark_run(&mut self, now: u64) {
        // Never move backwards
        self.last_run = Some(self.last_run.map_or(now, |last| last.max(now)));
    }
}

/// Fixed-size table of parameter tasks
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Box<[ParameterTask]>,
}

impl TaskRegistry {
    /// Build the registry, validating the table
    pub fn new(specs: Vec<TaskSpec>) -> Result<Self, SchedulerError> {
        if specs.is_empty() {
            return Err(SchedulerError::EmptyTable);
        }

        let mut seen = HashSet::new();
        for spec in &specs {
            if spec.name.is_empty() || spec.name.chars().count() > MAX_NAME_LEN {
                return Err(SchedulerError::InvalidName(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(SchedulerError::DuplicateName(spec.name.clone()));
            }
            if spec.interval_ms == 0 {
                return Err(SchedulerError::ZeroInterval(spec.name.clone()));
            }
        }

        let tasks: Vec<ParameterTask> = specs.into_iter().map(ParameterTask::new).collect();
        info!("Task registry created with {} parameters", tasks.len());
        Ok(Self {
            tasks: tasks.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParameterTask> {
        self.tasks.get(index)
    }

    /// Index of the first task polling `pid`
    pub fn position_of(&self, pid: Pid) -> Option<usize> {
        self.tasks.iter().position(|task| task.pid == pid)
    }

    /// Index of the due task that is furthest past due.
    ///
    /// Ties go to the task registered first.
    pub fn most_overdue(&self, now: u64) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (index, task) in self.tasks.iter().enumerate() {
            let Some(overdue) = task.overdue(now) else {
                continue;
            };
            if best.map_or(true, |(_, top)| overdue > top) {
                best = Some((index, overdue));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Store a decoded value and restart the task's cadence
    pub fn record_success(&mut self, index: usize, now: u64, value: Value) {
        if let Some(task) = self.tasks.get_mut(index) {
            task.mark_run(now);
            task.last_value = Some(value);
        }
    }

    /// Restart the task's cadence without a new value
    pub fn record_failure(&mut self, index: usize, now: u64) {
        if let Some(task) = self.tasks.get_mut(index) {
            task.mark_run(now);
        }
    }
}
