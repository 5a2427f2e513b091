//! Tick monitor state machine
//!
//! Measures the interval between consecutive tick boundaries, calibrates a
//! baseline over the first [`CALIBRATION_TICKS`] valid intervals and then
//! reports ticks that the configured [`ReportPredicate`] selects. GC pauses
//! arrive on an independent thread: during calibration they poison the
//! current interval, afterwards they are reported.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AtomicTimestamp, CalibrationStats, CalibrationSummary, ReportPredicate};
use crate::clock::{Clock, MonotonicClock};
use crate::dispatch::Dispatcher;
use crate::gc::{GcEvent, GcKind, GcListener, GcSource, GcSubscription};
use crate::models::{format_decimal, MessageLevel, MonitorEvent, MonitorMessage, Style};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sink::MessageSink;
use crate::tick::{TickCallback, TickSource};

/// Number of valid tick intervals averaged into the baseline
pub const CALIBRATION_TICKS: u64 = 120;

const DEFAULT_SESSION_NAME: &str = "tick-monitor";

/// Lifecycle phase of a monitor
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    /// No tick seen yet
    Uninitialized = 0,
    /// Accumulating the baseline
    Setup = 1,
    /// Baseline frozen, reporting slow ticks
    Monitoring = 2,
}

impl MonitorPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorPhase::Setup,
            2 => MonitorPhase::Monitoring,
            _ => MonitorPhase::Uninitialized,
        }
    }
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorPhase::Uninitialized => write!(f, "uninitialized"),
            MonitorPhase::Setup => write!(f, "setup"),
            MonitorPhase::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Missing collaborator when building a [`TickMonitor`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("tick source is required")]
    MissingTickSource,
    #[error("report predicate is required")]
    MissingPredicate,
    #[error("dispatcher is required")]
    MissingDispatcher,
    #[error("message sink is required")]
    MissingSink,
}

/// Percentage change of a tick relative to the baseline
///
/// A baseline that is not a positive finite number yields `0.0`, so a
/// non-finite value never reaches predicates or reports.
pub fn percentage_change(increase: f64, baseline: f64) -> f64 {
    if !(baseline > 0.0) || !baseline.is_finite() {
        return 0.0;
    }
    let change = increase * 100.0 / baseline;
    if change.is_finite() {
        change
    } else {
        0.0
    }
}

/// Live tick duration monitor for one session
pub struct TickMonitor {
    tick_source: Arc<dyn TickSource>,
    zero_tick: u64,
    clock: Arc<dyn Clock>,
    predicate: ReportPredicate,
    dispatcher: Arc<dyn Dispatcher>,
    sink: Arc<dyn MessageSink>,
    phase: AtomicU8,
    /// Previous tick boundary; the only field written by both paths
    last_tick: AtomicTimestamp,
    /// Written by the tick path only
    calibration: Mutex<CalibrationStats>,
    baseline: OnceLock<f64>,
    gc_subscription: Mutex<Option<GcSubscription>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl TickMonitor {
    pub fn builder() -> TickMonitorBuilder {
        TickMonitorBuilder::new()
    }

    pub fn phase(&self) -> MonitorPhase {
        MonitorPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: MonitorPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        self.metrics.set_phase(phase);
    }

    /// Frozen baseline average, available once monitoring has begun
    pub fn baseline(&self) -> Option<f64> {
        self.baseline.get().copied()
    }

    /// Snapshot of the calibration statistics
    pub fn calibration(&self) -> CalibrationStats {
        self.lock_calibration().clone()
    }

    pub fn predicate(&self) -> ReportPredicate {
        self.predicate
    }

    /// Raw tick counter value when the monitor was built
    pub fn zero_tick(&self) -> u64 {
        self.zero_tick
    }

    /// Current tick relative to the start of this monitor
    pub fn current_tick(&self) -> u64 {
        self.tick_source
            .current_tick()
            .saturating_sub(self.zero_tick)
    }

    /// Whether this monitor still holds a GC subscription
    pub fn is_gc_monitoring(&self) -> bool {
        self.lock_subscription()
            .as_ref()
            .is_some_and(GcSubscription::is_active)
    }

    /// Handle a tick boundary
    pub fn on_tick(&self, current_tick: u64) {
        let now = self.clock.now_millis();

        if self.phase() == MonitorPhase::Uninitialized {
            self.last_tick.store(now);
            self.set_phase(MonitorPhase::Setup);
            self.announce_start();
            return;
        }

        let tick = current_tick.saturating_sub(self.zero_tick);
        let Some(previous) = self.last_tick.swap(now) else {
            self.metrics.inc_ticks_discarded();
            self.logger.log_tick_discarded(tick);
            return;
        };

        let duration = now - previous;
        self.metrics.observe_tick(duration);
        if duration < 0.0 {
            self.logger.log_negative_duration(tick, duration);
        }

        if self.phase() == MonitorPhase::Setup {
            self.calibrate(duration);
        }

        if self.phase() == MonitorPhase::Monitoring {
            self.evaluate(tick, duration);
        }
    }

    /// Handle a GC pause reported by the runtime
    pub fn on_gc(&self, event: &GcEvent) {
        self.metrics.inc_gc_pauses_observed();

        if self.phase() == MonitorPhase::Setup {
            // Keep this interval out of the baseline
            self.last_tick.poison();

            // Calibration may have completed since the phase was read
            if self.phase() != MonitorPhase::Monitoring {
                return;
            }
        }

        let tick = self.current_tick();
        let duration = event.duration_ms;
        let kind = event.kind();
        let sink = self.sink.clone();
        let logger = self.logger.clone();

        self.metrics.inc_gc_pauses_reported();
        self.dispatcher.dispatch(Box::new(move || {
            logger.log_gc_pause(tick, duration, &kind.to_string());
            sink.send(&gc_pause_message(tick, duration, &kind));
        }));
    }

    /// Release the GC subscription
    ///
    /// Safe to call more than once and on monitors without GC monitoring.
    /// Reports already dispatched are neither awaited nor cancelled.
    pub fn close(&self) {
        let subscription = self.lock_subscription().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            self.logger.log_closed(self.phase());
        }
    }

    fn calibrate(&self, duration: f64) {
        let completed = {
            let mut stats = self.lock_calibration();
            stats.accept(duration);
            self.metrics.set_calibration_samples(stats.count());
            if stats.count() >= CALIBRATION_TICKS {
                stats.summary()
            } else {
                None
            }
        };

        let Some(summary) = completed else {
            return;
        };

        let baseline = *self.baseline.get_or_init(|| summary.average);
        self.metrics.set_baseline(baseline);
        self.set_phase(MonitorPhase::Monitoring);

        let predicate = self.predicate;
        let sink = self.sink.clone();
        let logger = self.logger.clone();
        self.dispatcher.dispatch(Box::new(move || {
            logger.log_calibration_complete(&summary);
            for message in calibration_messages(&summary, &predicate) {
                sink.send(&message);
            }
        }));
    }

    fn evaluate(&self, tick: u64, duration: f64) {
        let Some(baseline) = self.baseline() else {
            return;
        };

        let increase = duration - baseline;
        let change = percentage_change(increase, baseline);
        if !self.predicate.should_report(duration, increase, change) {
            return;
        }

        self.metrics.inc_slow_ticks_reported();
        let sink = self.sink.clone();
        let logger = self.logger.clone();
        self.dispatcher.dispatch(Box::new(move || {
            logger.log_slow_tick(tick, duration, change);
            sink.send(&slow_tick_message(tick, duration, change, baseline));
        }));
    }

    fn announce_start(&self) {
        let policy = self.predicate.to_string();
        let gc_monitoring = self.is_gc_monitoring();
        let sink = self.sink.clone();
        let logger = self.logger.clone();
        self.dispatcher.dispatch(Box::new(move || {
            logger.log_started(&policy, gc_monitoring);
            sink.send(&started_message());
        }));
    }

    fn lock_calibration(&self) -> MutexGuard<'_, CalibrationStats> {
        self.calibration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<GcSubscription>> {
        self.gc_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TickCallback for TickMonitor {
    fn on_tick(&self, tick: u64) {
        TickMonitor::on_tick(self, tick);
    }
}

impl GcListener for TickMonitor {
    fn on_gc(&self, event: &GcEvent) {
        TickMonitor::on_gc(self, event);
    }
}

impl std::fmt::Debug for TickMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickMonitor")
            .field("session", &self.logger.session())
            .field("phase", &self.phase())
            .field("zero_tick", &self.zero_tick)
            .field("predicate", &self.predicate)
            .field("baseline", &self.baseline())
            .finish()
    }
}

fn started_message() -> MonitorMessage {
    MonitorMessage::info(
        MonitorEvent::Started,
        format!(
            "Tick monitor started. Before the monitor becomes fully active, the average tick \
             duration will be calculated over a period of {} ticks.",
            CALIBRATION_TICKS
        ),
    )
}

fn calibration_messages(
    summary: &CalibrationSummary,
    predicate: &ReportPredicate,
) -> Vec<MonitorMessage> {
    let stat = |label: &str, field: &str, value: f64| {
        MonitorMessage::builder(MessageLevel::Info, MonitorEvent::CalibrationStat)
            .styled(">", Style::Plain)
            .text(format!(" {}: ", label))
            .styled(format_decimal(value), Style::Highlight)
            .text("ms")
            .field(field, value)
            .build()
    };

    vec![
        MonitorMessage::builder(MessageLevel::Info, MonitorEvent::CalibrationComplete)
            .styled("Analysis is now complete.", Style::Highlight)
            .field("samples", summary.count as f64)
            .build(),
        stat("Max", "max_ms", summary.max),
        stat("Min", "min_ms", summary.min),
        stat("Average", "average_ms", summary.average),
        MonitorMessage::builder(MessageLevel::Info, MonitorEvent::MonitoringPolicy)
            .text(predicate.describe_start())
            .field("threshold", predicate.threshold())
            .build(),
    ]
}

fn slow_tick_message(tick: u64, duration: f64, change: f64, baseline: f64) -> MonitorMessage {
    MonitorMessage::builder(MessageLevel::Alert, MonitorEvent::SlowTick)
        .text("Tick ")
        .styled(format!("#{}", tick), Style::Muted)
        .text(" lasted ")
        .styled(format_decimal(duration), Style::Highlight)
        .text(" ms. (")
        .styled(format!("{}%", format_decimal(change)), Style::Highlight)
        .text(" increase from avg)")
        .field("tick", tick as f64)
        .field("duration_ms", duration)
        .field("percentage_change", change)
        .field("baseline_ms", baseline)
        .build()
}

fn gc_pause_message(tick: u64, duration: f64, kind: &GcKind) -> MonitorMessage {
    MonitorMessage::builder(MessageLevel::Info, MonitorEvent::GcPause)
        .text("Tick ")
        .styled(format!("#{}", tick), Style::Muted)
        .text(" included ")
        .styled("GC", Style::Warning)
        .text(" lasting ")
        .styled(format_decimal(duration), Style::Highlight)
        .text(format!(" ms. (type = {})", kind))
        .field("tick", tick as f64)
        .field("duration_ms", duration)
        .build()
}

/// Builder for [`TickMonitor`]
pub struct TickMonitorBuilder {
    tick_source: Option<Arc<dyn TickSource>>,
    predicate: Option<ReportPredicate>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    sink: Option<Arc<dyn MessageSink>>,
    clock: Option<Arc<dyn Clock>>,
    gc_source: Option<Arc<dyn GcSource>>,
    monitor_gc: bool,
    session: String,
}

impl TickMonitorBuilder {
    /// Create a new builder; GC monitoring is on whenever a GC source is set
    pub fn new() -> Self {
        Self {
            tick_source: None,
            predicate: None,
            dispatcher: None,
            sink: None,
            clock: None,
            gc_source: None,
            monitor_gc: true,
            session: DEFAULT_SESSION_NAME.to_string(),
        }
    }

    /// Set the tick counter source
    pub fn tick_source(mut self, source: Arc<dyn TickSource>) -> Self {
        self.tick_source = Some(source);
        self
    }

    /// Set the report predicate
    pub fn predicate(mut self, predicate: ReportPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Set the dispatcher running report work
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the message sink
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the clock (defaults to [`MonotonicClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the GC pause source
    pub fn gc_source(mut self, source: Arc<dyn GcSource>) -> Self {
        self.gc_source = Some(source);
        self
    }

    /// Enable or disable GC monitoring
    pub fn monitor_gc(mut self, enabled: bool) -> Self {
        self.monitor_gc = enabled;
        self
    }

    /// Name used in structured logs
    pub fn session(mut self, name: impl Into<String>) -> Self {
        self.session = name.into();
        self
    }

    /// Build the monitor and subscribe it to the GC source
    pub fn build(self) -> Result<Arc<TickMonitor>, BuildError> {
        let tick_source = self.tick_source.ok_or(BuildError::MissingTickSource)?;
        let predicate = self.predicate.ok_or(BuildError::MissingPredicate)?;
        let dispatcher = self.dispatcher.ok_or(BuildError::MissingDispatcher)?;
        let sink = self.sink.ok_or(BuildError::MissingSink)?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let metrics = MonitorMetrics::new(self.session.clone());
        metrics.set_phase(MonitorPhase::Uninitialized);
        metrics.set_calibration_samples(0);

        let monitor = Arc::new(TickMonitor {
            zero_tick: tick_source.current_tick(),
            tick_source,
            clock,
            predicate,
            dispatcher,
            sink,
            phase: AtomicU8::new(MonitorPhase::Uninitialized as u8),
            last_tick: AtomicTimestamp::unset(),
            calibration: Mutex::new(CalibrationStats::new()),
            baseline: OnceLock::new(),
            gc_subscription: Mutex::new(None),
            metrics,
            logger: StructuredLogger::new(self.session),
        });

        if self.monitor_gc {
            if let Some(source) = self.gc_source {
                let listener: Arc<dyn GcListener> = monitor.clone();
                let subscription = source.subscribe(Arc::downgrade(&listener));
                *monitor.lock_subscription() = Some(subscription);
            }
        }

        Ok(monitor)
    }
}

impl Default for TickMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
