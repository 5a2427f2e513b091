//! Monitor configuration

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tickmon_lib::ReportPredicate;

use crate::output::OutputFormat;

/// Monitor configuration
///
/// Layered as defaults, then an optional config file, then `TICKMON_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Report ticks this many percent slower than the baseline
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,

    /// Report ticks longer than this many milliseconds instead
    #[serde(default)]
    pub threshold_tick_ms: Option<f64>,

    /// Correlate GC pauses with ticks
    #[serde(default = "default_monitor_gc")]
    pub monitor_gc: bool,

    /// Target duration of one simulated tick
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Maximum random jitter added to each tick
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,

    /// Inject a stall every N ticks (0 disables)
    #[serde(default)]
    pub stall_every: u64,

    /// Length of an injected stall
    #[serde(default)]
    pub stall_ms: u64,

    /// Simulate a GC pause this often (0 disables)
    #[serde(default)]
    pub gc_every_ms: u64,

    /// Length of a simulated minor GC pause
    #[serde(default = "default_gc_pause")]
    pub gc_pause_ms: u64,

    /// Stop after this many seconds (0 runs until Ctrl-C)
    #[serde(default)]
    pub duration_secs: u64,

    /// Message output format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_threshold_percent() -> f64 {
    100.0
}

fn default_monitor_gc() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    50
}

fn default_jitter() -> u64 {
    2
}

fn default_gc_pause() -> u64 {
    15
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: default_threshold_percent(),
            threshold_tick_ms: None,
            monitor_gc: default_monitor_gc(),
            tick_interval_ms: default_tick_interval(),
            jitter_ms: default_jitter(),
            stall_every: 0,
            stall_ms: 0,
            gc_every_ms: 0,
            gc_pause_ms: default_gc_pause(),
            duration_secs: 0,
            format: OutputFormat::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("TICKMON").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject settings the simulated loop cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        ensure!(
            self.threshold_percent.is_finite(),
            "threshold_percent must be a finite number"
        );
        if let Some(threshold) = self.threshold_tick_ms {
            ensure!(
                threshold.is_finite() && threshold >= 0.0,
                "threshold_tick_ms must be a non-negative number"
            );
        }
        if self.stall_every > 0 {
            ensure!(self.stall_ms > 0, "stall_ms must be positive when stall_every is set");
        }
        Ok(())
    }

    /// Report predicate selected by the thresholds
    pub fn predicate(&self) -> Result<ReportPredicate> {
        let predicate = match self.threshold_tick_ms {
            Some(threshold) => ReportPredicate::absolute(threshold)?,
            None => ReportPredicate::relative(self.threshold_percent)?,
        };
        Ok(predicate)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn run_duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}
