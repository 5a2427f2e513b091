//! Tick duration monitoring
//!
//! This module provides:
//! - Baseline calibration over the first tick intervals
//! - Report predicates deciding which ticks are worth an alert
//! - The monitor state machine correlating ticks with GC pauses

mod predicate;
mod stats;
mod tick_monitor;
mod timestamp;

pub use predicate::{PredicateError, ReportPredicate};
pub use stats::{CalibrationStats, CalibrationSummary};
pub use tick_monitor::{
    percentage_change, BuildError, MonitorPhase, TickMonitor, TickMonitorBuilder,
    CALIBRATION_TICKS,
};
pub use timestamp::AtomicTimestamp;
