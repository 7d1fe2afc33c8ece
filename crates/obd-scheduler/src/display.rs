//! Display Sink Interface

/// How a warning combines with what is already shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningMode {
    Replace,
    Prepend,
}

/// Narrow interface to the dashboard widgets
pub trait DisplaySink {
    /// Speed gauge
    fn set_gauge(&mut self, value: i64);

    /// Per-parameter value label
    fn set_label(&mut self, name: &str, text: &str);

    /// Warning area
    fn set_warning(&mut self, text: &str, mode: WarningMode);

    /// Next point of the two-series chart
    fn append_chart_point(&mut self, series_a: f64, series_b: f64);

    /// Pick up updates posted from outside the polling loop (once per iteration)
    fn refresh(&mut self) {}
}
