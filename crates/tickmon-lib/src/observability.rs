//! Observability infrastructure for the tick monitor
//!
//! Provides:
//! - Prometheus metrics (tick durations, discarded intervals, reports, GC pauses)
//! - Structured logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge_vec,
    GaugeVec, Histogram, IntCounter, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::monitor::{CalibrationSummary, MonitorPhase};

/// Histogram buckets for tick durations (in milliseconds)
const TICK_DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 75.0, 100.0, 150.0, 250.0, 500.0, 1000.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    tick_duration_ms: Histogram,
    ticks_observed: IntCounter,
    ticks_discarded: IntCounter,
    calibration_samples: IntGaugeVec,
    baseline_tick_ms: GaugeVec,
    monitor_phase: IntGaugeVec,
    slow_ticks_reported: IntCounter,
    gc_pauses_observed: IntCounter,
    gc_pauses_reported: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            tick_duration_ms: register_histogram!(
                "tickmon_tick_duration_ms",
                "Measured wall-clock duration of each tick in milliseconds",
                TICK_DURATION_BUCKETS_MS.to_vec()
            )
            .expect("Failed to register tick_duration_ms"),

            ticks_observed: register_int_counter!(
                "tickmon_ticks_observed_total",
                "Tick intervals measured by the monitor"
            )
            .expect("Failed to register ticks_observed"),

            ticks_discarded: register_int_counter!(
                "tickmon_ticks_discarded_total",
                "Tick intervals discarded because a GC pause fell inside them"
            )
            .expect("Failed to register ticks_discarded"),

            calibration_samples: register_int_gauge_vec!(
                "tickmon_calibration_samples",
                "Tick intervals accumulated towards the baseline",
                &["session"]
            )
            .expect("Failed to register calibration_samples"),

            baseline_tick_ms: register_gauge_vec!(
                "tickmon_baseline_tick_ms",
                "Baseline average tick duration in milliseconds",
                &["session"]
            )
            .expect("Failed to register baseline_tick_ms"),

            monitor_phase: register_int_gauge_vec!(
                "tickmon_phase",
                "Monitor lifecycle phase (0 = uninitialized, 1 = setup, 2 = monitoring)",
                &["session"]
            )
            .expect("Failed to register monitor_phase"),

            slow_ticks_reported: register_int_counter!(
                "tickmon_slow_ticks_reported_total",
                "Ticks reported as slower than the configured policy allows"
            )
            .expect("Failed to register slow_ticks_reported"),

            gc_pauses_observed: register_int_counter!(
                "tickmon_gc_pauses_observed_total",
                "Garbage-collection pauses received from the GC source"
            )
            .expect("Failed to register gc_pauses_observed"),

            gc_pauses_reported: register_int_counter!(
                "tickmon_gc_pauses_reported_total",
                "Garbage-collection pauses reported to the operator"
            )
            .expect("Failed to register gc_pauses_reported"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance. Counters
/// are shared by every monitor in the process; gauges carry a `session`
/// label so concurrent monitors do not overwrite each other.
#[derive(Clone, Debug)]
pub struct MonitorMetrics {
    session: String,
}

impl MonitorMetrics {
    /// Create a metrics handle for one session (initializes global metrics if needed)
    pub fn new(session: impl Into<String>) -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self {
            session: session.into(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    #[cfg(test)]
    pub(crate) fn phase_value(&self) -> i64 {
        self.inner()
            .monitor_phase
            .with_label_values(&[self.session.as_str()])
            .get()
    }

    /// Record a measured tick interval
    pub fn observe_tick(&self, duration_ms: f64) {
        let inner = self.inner();
        inner.ticks_observed.inc();
        if let Some(sample) = histogram_sample(duration_ms) {
            inner.tick_duration_ms.observe(sample);
        }
    }

    pub fn inc_ticks_discarded(&self) {
        self.inner().ticks_discarded.inc();
    }

    pub fn set_calibration_samples(&self, samples: u64) {
        self.inner()
            .calibration_samples
            .with_label_values(&[self.session.as_str()])
            .set(i64::try_from(samples).unwrap_or(i64::MAX));
    }

    pub fn set_baseline(&self, baseline_ms: f64) {
        self.inner()
            .baseline_tick_ms
            .with_label_values(&[self.session.as_str()])
            .set(baseline_ms);
    }

    pub fn set_phase(&self, phase: MonitorPhase) {
        self.inner()
            .monitor_phase
            .with_label_values(&[self.session.as_str()])
            .set(phase as i64);
    }

    pub fn inc_slow_ticks_reported(&self) {
        self.inner().slow_ticks_reported.inc();
    }

    pub fn inc_gc_pauses_observed(&self) {
        self.inner().gc_pauses_observed.inc();
    }

    pub fn inc_gc_pauses_reported(&self) {
        self.inner().gc_pauses_reported.inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render() -> String {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Histogram value for a tick interval
///
/// Negative (clock skew) and non-finite intervals are counted as observed
/// ticks but kept out of the duration histogram.
fn histogram_sample(duration_ms: f64) -> Option<f64> {
    (duration_ms.is_finite() && duration_ms >= 0.0).then_some(duration_ms)
}

/// Structured logger for monitor events
///
/// Provides consistent field names for the lifecycle and report events of
/// one monitoring session.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    session: String,
}

impl StructuredLogger {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Log the start of calibration
    pub fn log_started(&self, policy: &str, gc_monitoring: bool) {
        info!(
            event = "monitor_started",
            session = %self.session,
            policy = %policy,
            gc_monitoring = gc_monitoring,
            "Tick monitor started, calibrating baseline"
        );
    }

    /// Log the end of calibration
    pub fn log_calibration_complete(&self, summary: &CalibrationSummary) {
        info!(
            event = "calibration_complete",
            session = %self.session,
            samples = summary.count,
            min_ms = summary.min,
            max_ms = summary.max,
            average_ms = summary.average,
            "Baseline established"
        );
    }

    /// Log a tick that exceeded the report policy
    pub fn log_slow_tick(&self, tick: u64, duration_ms: f64, percentage_change: f64) {
        warn!(
            event = "slow_tick",
            session = %self.session,
            tick = tick,
            duration_ms = duration_ms,
            percentage_change = percentage_change,
            "Slow tick detected"
        );
    }

    /// Log a GC pause outside calibration
    pub fn log_gc_pause(&self, tick: u64, duration_ms: f64, kind: &str) {
        info!(
            event = "gc_pause",
            session = %self.session,
            tick = tick,
            duration_ms = duration_ms,
            gc_kind = %kind,
            "GC pause observed"
        );
    }

    /// Log a tick interval excluded from calibration
    pub fn log_tick_discarded(&self, tick: u64) {
        debug!(
            event = "tick_discarded",
            session = %self.session,
            tick = tick,
            "Tick interval contained a GC pause, excluded from baseline"
        );
    }

    /// Log a negative tick duration (clock skew)
    pub fn log_negative_duration(&self, tick: u64, duration_ms: f64) {
        debug!(
            event = "negative_tick_duration",
            session = %self.session,
            tick = tick,
            duration_ms = duration_ms,
            "Tick duration is negative, clock went backwards"
        );
    }

    /// Log session shutdown
    pub fn log_closed(&self, phase: MonitorPhase) {
        info!(
            event = "monitor_closed",
            session = %self.session,
            phase = %phase,
            "Tick monitor closed"
        );
    }
}
