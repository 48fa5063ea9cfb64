//! Prometheus summary for cursor spans.
//!
//! Every released span is recorded into one summary, exposed by the Prometheus
//! exporter (default: `/metrics` on the configured port).
//!
//! # Available Metrics
//!
//! ## Summaries
//! - `rk_cursor_elapsedNano` - Span duration in nanoseconds (labels per
//!   [`LabelSchema`](crate::labels::LabelSchema)), quantiles 0.5/0.9/0.99/0.999
//!
//! # Usage
//!
//! ```rust,ignore
//! use rk_cursor::metrics::init_metrics;
//!
//! // Install the exporter (call once at startup)
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! ```
//!
//! Tests and embedded registries can skip the global exporter and inject a
//! recorder into a [`MetricSink`] instead:
//!
//! ```rust,ignore
//! let recorder = rk_cursor::metrics::build_recorder()?;
//! let handle = recorder.handle();
//! let sink = MetricSink::with_recorder(Arc::new(recorder));
//! // ... record spans ...
//! println!("{}", handle.render());
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use metrics::{Label, Recorder, Unit, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tracing::{error, info, trace};

use crate::error::{CursorError, CursorResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const NAMESPACE: &str = "rk";
    pub const SUBSYSTEM: &str = "cursor";
    pub const ELAPSED_NANO: &str = "rk_cursor_elapsedNano";
}

/// Summary objectives as `(quantile, allowed error)`.
///
/// The exporter computes quantiles with a relative-error sketch; the error
/// column documents the intended precision and is not enforced per quantile.
pub const OBJECTIVES: [(f64, f64); 4] = [(0.5, 0.05), (0.9, 0.01), (0.99, 0.001), (0.999, 0.0001)];

/// Quantiles exported for the summary.
pub fn quantiles() -> [f64; 4] {
    OBJECTIVES.map(|(q, _)| q)
}

/// Exporter builder with the cursor summary quantiles applied.
fn builder() -> CursorResult<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_quantiles(&quantiles())
        .map_err(|e| CursorError::MetricsInit(format!("Invalid summary quantiles: {e}")))
}

fn describe() {
    describe_histogram!(
        names::ELAPSED_NANO,
        Unit::Nanoseconds,
        "Elapsed time of cursor spans in nanoseconds"
    );
}

/// Initialize the Prometheus metrics exporter.
///
/// This installs the global recorder and starts the Prometheus HTTP listener
/// on the specified address.
///
/// # Errors
///
/// Returns `CursorError::MetricsInit` if the exporter cannot be installed
/// (for example, a recorder is already installed or the port is taken).
pub fn init_metrics(metrics_addr: SocketAddr) -> CursorResult<()> {
    builder()?
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| CursorError::MetricsInit(format!("Failed to install Prometheus exporter: {e}")))?;

    describe();

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
///
/// Spans recorded without an installed exporter are dropped silently.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Build an uninstalled recorder configured for the cursor summary.
///
/// Render its output through `recorder.handle().render()`.
pub fn build_recorder() -> CursorResult<PrometheusRecorder> {
    let recorder = builder()?.build_recorder();
    metrics::with_local_recorder(&recorder, describe);
    Ok(recorder)
}

/// Destination for span observations.
#[derive(Clone)]
pub struct MetricSink {
    enabled: bool,
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl MetricSink {
    /// Sink recording into the globally installed recorder.
    pub fn global() -> Self {
        Self {
            enabled: true,
            recorder: None,
        }
    }

    /// Sink recording into a dedicated recorder.
    pub fn with_recorder(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self {
            enabled: true,
            recorder: Some(recorder),
        }
    }

    /// Sink that drops every observation.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            recorder: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one span duration.
    ///
    /// A label vector whose length differs from `keys` is dropped; recording
    /// never fails the instrumented code path.
    pub fn record(&self, elapsed_nanos: f64, keys: &[&'static str], values: &[String]) {
        if !self.enabled {
            return;
        }
        if keys.len() != values.len() {
            trace!(
                expected = keys.len(),
                actual = values.len(),
                "Dropping cursor observation with mismatched label arity"
            );
            return;
        }

        let labels: Vec<Label> = keys
            .iter()
            .zip(values)
            .map(|(key, value)| Label::new(*key, value.clone()))
            .collect();

        match &self.recorder {
            Some(recorder) => metrics::with_local_recorder(&**recorder, || {
                histogram!(names::ELAPSED_NANO, labels).record(elapsed_nanos);
            }),
            None => histogram!(names::ELAPSED_NANO, labels).record(elapsed_nanos),
        }
    }
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for MetricSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSink")
            .field("enabled", &self.enabled)
            .field("local_recorder", &self.recorder.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn count_lines(rendered: &str) -> usize {
        rendered
            .lines()
            .filter(|l| l.starts_with("rk_cursor_elapsedNano_count"))
            .count()
    }

    #[test]
    fn test_quantiles_match_objectives() {
        assert_eq!(quantiles(), [0.5, 0.9, 0.99, 0.999]);
    }

    #[test]
    fn test_record_without_exporter_does_not_panic() {
        // Should not panic even without metrics initialized
        MetricSink::global().record(1_000.0, &["operation"], &["op".to_string()]);
    }

    #[test]
    fn test_record_into_local_recorder() {
        let recorder = build_recorder().unwrap();
        let handle = recorder.handle();
        let sink = MetricSink::with_recorder(Arc::new(recorder));

        sink.record(
            2_500.0,
            &["operation", "status"],
            &["op".to_string(), "OK".to_string()],
        );

        let rendered = handle.render();
        assert!(rendered.contains("# TYPE rk_cursor_elapsedNano summary"));
        assert!(rendered.contains("quantile=\"0.99\""));
        assert_eq!(count_lines(&rendered), 1);
    }

    #[test]
    fn test_record_arity_mismatch_is_dropped() {
        let recorder = build_recorder().unwrap();
        let handle = recorder.handle();
        let sink = MetricSink::with_recorder(Arc::new(recorder));

        sink.record(1.0, &["operation", "status"], &["op".to_string()]);

        assert_eq!(count_lines(&handle.render()), 0);
    }

    #[test]
    fn test_disabled_sink_drops_everything() {
        let recorder = build_recorder().unwrap();
        let handle = recorder.handle();
        let sink = MetricSink {
            enabled: false,
            recorder: Some(Arc::new(recorder)),
        };
        assert!(!sink.is_enabled());

        sink.record(1.0, &["operation"], &["op".to_string()]);

        assert_eq!(count_lines(&handle.render()), 0);
        assert!(!MetricSink::disabled().is_enabled());
    }
}
