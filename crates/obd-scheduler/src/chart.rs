//! Chart Aggregator
//!
//! Barrier over a set of dependent tasks: a chart point is emitted only once
//! every dependent has completed since the previous point, so no point mixes
//! a fresh value for one series with a stale value for another.

use crate::display::DisplaySink;
use crate::registry::TaskRegistry;
use obd_protocol::Pid;
use tracing::debug;

/// Emits a two-series chart point once per refresh generation
#[derive(Debug, Clone)]
pub struct ChartAggregator {
    /// Tasks summed into series A
    series_a: Vec<usize>,
    /// Tasks summed into series B
    series_b: Vec<usize>,
    /// Time of the last emitted point
    watermark: u64,
}

impl ChartAggregator {
    pub fn new(series_a: Vec<usize>, series_b: Vec<usize>) -> Self {
        Self {
            series_a,
            series_b,
            watermark: 0,
        }
    }

    /// Fuel trim chart: bank 1 (STFT1 + LTFT1) against bank 2 (STFT2 + LTFT2).
    ///
    /// `None` unless all four trims are in the registry.
    pub fn fuel_trim(registry: &TaskRegistry) -> Option<Self> {
        let bank1 = vec![
            registry.position_of(Pid::ShortFuelTrimBank1)?,
            registry.position_of(Pid::LongFuelTrimBank1)?,
        ];
        let bank2 = vec![
            registry.position_of(Pid::ShortFuelTrimBank2)?,
            registry.position_of(Pid::LongFuelTrimBank2)?,
        ];
        Some(Self::new(bank1, bank2))
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn depends_on(&self, index: usize) -> bool {
        self.series_a.contains(&index) || self.series_b.contains(&index)
    }

    /// Re-evaluate after task `index` succeeded
    pub fn on_success<D: DisplaySink>(
        &mut self,
        index: usize,
        registry: &TaskRegistry,
        now: u64,
        display: &mut D,
    ) -> bool {
        self.depends_on(index) && self.evaluate(registry, now, display)
    }

    /// Emit a point if every dependent has refreshed since the watermark
    pub fn evaluate<D: DisplaySink>(&mut self, registry: &TaskRegistry, now: u64, display: &mut D) -> bool {
        let (Some(a), Some(b)) = (self.sum(&self.series_a, registry), self.sum(&self.series_b, registry)) else {
            return false;
        };

        debug!("Chart point {:.2} / {:.2} at {}", a, b, now);
        display.append_chart_point(a, b);
        self.watermark = now;
        true
    }

    /// Sum of the series' latest values, `None` while any dependent is stale
    fn sum(&self, series: &[usize], registry: &TaskRegistry) -> Option<f64> {
        series.iter().try_fold(0.0, |total, &index| {
            let task = registry.get(index)?;
            if task.last_run()? < self.watermark {
                return None;
            }
            Some(total + task.last_value()?.as_f64()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{default_tasks, TaskSpec};
    use crate::testing::RecordingDisplay;
    use obd_protocol::Value;

    fn trim_registry() -> TaskRegistry {
        TaskRegistry::new(vec![
            TaskSpec::new("stft1", Pid::ShortFuelTrimBank1, 50),
            TaskSpec::new("ltft1", Pid::LongFuelTrimBank1, 50),
            TaskSpec::new("stft2", Pid::ShortFuelTrimBank2, 50),
            TaskSpec::new("ltft2", Pid::LongFuelTrimBank2, 50),
        ])
        .unwrap()
    }

    #[test]
    fn test_barrier_withholds_until_all_refresh() {
        let mut registry = trim_registry();
        let mut chart = ChartAggregator::fuel_trim(&registry).unwrap();
        let mut display = RecordingDisplay::default();
        chart.watermark = 95;

        registry.record_success(0, 100, Value::Number(1.0));
        registry.record_success(1, 100, Value::Number(2.0));
        registry.record_success(2, 100, Value::Number(3.0));
        registry.record_success(3, 90, Value::Number(4.0));
        assert!(!chart.on_success(2, &registry, 100, &mut display));
        assert!(display.chart_points.is_empty());

        registry.record_success(3, 101, Value::Number(5.0));
        assert!(chart.on_success(3, &registry, 101, &mut display));
        assert_eq!(display.chart_points, vec![(3.0, 8.0)]);
        assert_eq!(chart.watermark(), 101);

        // Only ltft2 is at the new watermark; the rest must refresh again
        registry.record_success(0, 102, Value::Number(1.0));
        assert!(!chart.on_success(0, &registry, 102, &mut display));
        assert_eq!(display.chart_points.len(), 1);
    }

    #[test]
    fn test_never_polled_dependent_blocks() {
        let mut registry = trim_registry();
        let mut chart = ChartAggregator::fuel_trim(&registry).unwrap();
        let mut display = RecordingDisplay::default();

        for index in 0..3 {
            registry.record_success(index, 10, Value::Number(0.0));
        }
        assert!(!chart.on_success(2, &registry, 10, &mut display));

        // A failure refreshes last-run but provides no value
        registry.record_failure(3, 11);
        assert!(!chart.evaluate(&registry, 11, &mut display));
        assert!(display.chart_points.is_empty());
    }

    #[test]
    fn test_non_dependent_ignored() {
        let registry = TaskRegistry::new(default_tasks()).unwrap();
        let mut chart = ChartAggregator::fuel_trim(&registry).unwrap();
        let mut display = RecordingDisplay::default();
        assert!(!chart.depends_on(0));
        assert!(!chart.on_success(0, &registry, 10, &mut display));
    }

    #[test]
    fn test_missing_trim_disables_chart() {
        let registry = TaskRegistry::new(vec![TaskSpec::new("kph", Pid::Speed, 50)]).unwrap();
        assert!(ChartAggregator::fuel_trim(&registry).is_none());
    }
}
