//! Tick Monitor - live tick duration monitor
//!
//! Drives a simulated periodic loop, learns its normal tick duration and
//! reports ticks that run too long along with the GC pauses that hit them.

mod config;
mod host;
mod output;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickmon_lib::{GcEventBus, MonitorMetrics, TickHook, TickMonitor, TokioDispatcher};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::MonitorConfig;
use host::{GcSimConfig, LoopConfig, PauseInjector};
use output::{ConsoleSink, OutputFormat};

/// Live tick duration monitor
#[derive(Parser)]
#[command(name = "tickmon")]
#[command(author, version, about = "Report slow ticks of a periodic loop", long_about = None)]
pub struct Cli {
    /// Configuration file (can also be set via TICKMON_CONFIG env var)
    #[arg(long, env = "TICKMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report ticks this many percent slower than the average
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Report ticks longer than this many milliseconds
    #[arg(long, conflicts_with = "threshold")]
    pub threshold_tick: Option<f64>,

    /// Do not correlate GC pauses with ticks
    #[arg(long)]
    pub without_gc: bool,

    /// Target duration of one simulated tick
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// Maximum random jitter added to each tick
    #[arg(long)]
    pub jitter_ms: Option<u64>,

    /// Inject a stall every N ticks
    #[arg(long)]
    pub stall_every: Option<u64>,

    /// Length of an injected stall
    #[arg(long)]
    pub stall_ms: Option<u64>,

    /// Simulate a GC pause this often
    #[arg(long)]
    pub gc_every_ms: Option<u64>,

    /// Length of a simulated minor GC pause
    #[arg(long)]
    pub gc_pause_ms: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Message output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Write logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    pub print_metrics: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Command-line flags take precedence over file and environment
    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(threshold) = self.threshold {
            config.threshold_percent = threshold;
            config.threshold_tick_ms = None;
        }
        if let Some(threshold) = self.threshold_tick {
            config.threshold_tick_ms = Some(threshold);
        }
        if self.without_gc {
            config.monitor_gc = false;
        }
        if let Some(value) = self.tick_interval_ms {
            config.tick_interval_ms = value;
        }
        if let Some(value) = self.jitter_ms {
            config.jitter_ms = value;
        }
        if let Some(value) = self.stall_every {
            config.stall_every = value;
        }
        if let Some(value) = self.stall_ms {
            config.stall_ms = value;
        }
        if let Some(value) = self.gc_every_ms {
            config.gc_every_ms = value;
        }
        if let Some(value) = self.gc_pause_ms {
            config.gc_pause_ms = value;
        }
        if let Some(value) = self.duration_secs {
            config.duration_secs = value;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    // Messages own stdout, logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = MonitorConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    let predicate = config.predicate()?;

    info!(
        predicate = %predicate,
        monitor_gc = config.monitor_gc,
        tick_interval_ms = config.tick_interval_ms,
        "Starting tickmon"
    );

    let hook = Arc::new(TickHook::new());
    let bus = GcEventBus::new();
    let (dispatcher, worker) = TokioDispatcher::spawn_current();

    let monitor = TickMonitor::builder()
        .session("tickmon")
        .tick_source(hook.clone())
        .predicate(predicate)
        .dispatcher(Arc::new(dispatcher))
        .sink(Arc::new(ConsoleSink::new(config.format)))
        .gc_source(Arc::new(bus.clone()))
        .monitor_gc(config.monitor_gc)
        .build()
        .context("Failed to build tick monitor")?;
    let callback_id = hook.add_callback(monitor.clone());

    let running = Arc::new(AtomicBool::new(true));
    let pauses = Arc::new(PauseInjector::new());
    let loop_handle = host::spawn_tick_loop(
        hook.clone(),
        bus.clone(),
        LoopConfig::from(&config),
        pauses.clone(),
        running.clone(),
    )
    .context("Failed to start tick loop thread")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let gc_handle = (config.gc_every_ms > 0).then(|| {
        tokio::spawn(host::run_gc_simulator(
            GcSimConfig {
                every: Duration::from_millis(config.gc_every_ms),
                pause: Duration::from_millis(config.gc_pause_ms),
            },
            pauses.clone(),
            shutdown_tx.subscribe(),
        ))
    });

    match config.run_duration() {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    info!(duration_secs = duration.as_secs(), "Run duration elapsed");
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("SIGINT received");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("SIGINT received");
        }
    }

    info!("Shutting down");

    running.store(false, Ordering::Release);
    let iterations = tokio::task::spawn_blocking(move || loop_handle.join())
        .await?
        .map_err(|_| anyhow!("Tick loop thread panicked"))?;

    // Receivers may already be gone when the simulator is disabled
    let _ = shutdown_tx.send(());
    if let Some(handle) = gc_handle {
        handle.await?;
    }

    monitor.close();
    hook.remove_callback(callback_id);
    drop(monitor);

    // The worker exits after flushing every queued report
    worker.await?;

    info!(iterations = iterations, "Tick monitor stopped");

    if cli.print_metrics {
        print!("{}", MonitorMetrics::render());
    }

    Ok(())
}
