//! Tick monitor library
//!
//! This crate provides the core functionality for:
//! - Measuring tick durations of a periodic main loop
//! - Calibrating a baseline and reporting slow ticks
//! - Correlating garbage-collection pauses with ticks
//! - Dispatching reports off the measured thread

pub mod clock;
pub mod dispatch;
pub mod gc;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod sink;
pub mod tick;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use dispatch::{Dispatcher, InlineDispatcher, Job, TokioDispatcher};
pub use gc::{GcEvent, GcEventBus, GcKind, GcListener, GcSource, GcSubscription};
pub use models::*;
pub use monitor::{
    BuildError, CalibrationStats, CalibrationSummary, MonitorPhase, PredicateError,
    ReportPredicate, TickMonitor, TickMonitorBuilder, CALIBRATION_TICKS,
};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use sink::{CollectingSink, MessageSink, TracingSink};
pub use tick::{TickCallback, TickHook, TickSource};
