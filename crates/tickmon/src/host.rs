//! Simulated host loop
//!
//! Runs a periodic loop on a dedicated thread and marks each iteration on a
//! [`TickHook`], with optional injected stalls and synthetic GC pauses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tickmon_lib::gc::{MAJOR_GC_ACTION, MINOR_GC_ACTION};
use tickmon_lib::{GcEvent, GcEventBus, TickHook};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::MonitorConfig;

/// Every n-th simulated collection is a major one
const MAJOR_GC_EVERY: u64 = 5;

/// Major collections pause this many times longer than minor ones
const MAJOR_GC_FACTOR: u64 = 4;

/// Settings for the simulated tick loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: Duration,
    pub jitter: Duration,
    pub stall_every: u64,
    pub stall: Duration,
}

impl From<&MonitorConfig> for LoopConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: config.tick_interval(),
            jitter: Duration::from_millis(config.jitter_ms),
            stall_every: config.stall_every,
            stall: Duration::from_millis(config.stall_ms),
        }
    }
}

/// A collection the loop should simulate in its current iteration
#[derive(Debug, Clone, PartialEq)]
pub struct GcRequest {
    pub action: &'static str,
    pub pause: Duration,
}

/// Pending collections handed from the GC simulator to the loop
///
/// The loop thread performs each pause itself and announces it on the GC
/// bus before marking the tick, so the interval that grew is the one that
/// gets poisoned.
#[derive(Debug, Default)]
pub struct PauseInjector {
    pending: Mutex<Vec<GcRequest>>,
}

impl PauseInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to collect during its current iteration
    pub fn request(&self, action: &'static str, pause: Duration) {
        self.lock().push(GcRequest { action, pause });
    }

    /// Take every pending collection
    pub fn take(&self) -> Vec<GcRequest> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GcRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start the tick loop on its own thread
///
/// The loop runs until `running` is cleared and returns the number of
/// iterations it completed.
pub fn spawn_tick_loop(
    hook: Arc<TickHook>,
    bus: GcEventBus,
    config: LoopConfig,
    pauses: Arc<PauseInjector>,
    running: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<u64>> {
    thread::Builder::new()
        .name("tick-loop".to_string())
        .spawn(move || run_tick_loop(&hook, &bus, &config, &pauses, &running))
}

fn run_tick_loop(
    hook: &TickHook,
    bus: &GcEventBus,
    config: &LoopConfig,
    pauses: &PauseInjector,
    running: &AtomicBool,
) -> u64 {
    info!(
        interval_ms = config.interval.as_millis() as u64,
        stall_every = config.stall_every,
        "Starting tick loop"
    );

    let mut iterations = 0u64;
    while running.load(Ordering::Acquire) {
        let mut work = config.interval
            + Duration::from_millis(rand_jitter(config.jitter.as_millis() as u64));

        if config.stall_every > 0 && iterations > 0 && iterations % config.stall_every == 0 {
            debug!(
                iteration = iterations,
                stall_ms = config.stall.as_millis() as u64,
                "Injecting stall"
            );
            work += config.stall;
        }

        thread::sleep(work);

        for request in pauses.take() {
            thread::sleep(request.pause);
            bus.publish(&GcEvent::new(
                request.pause.as_secs_f64() * 1000.0,
                request.action,
            ));
        }

        hook.tick();
        iterations += 1;
    }

    info!(iterations = iterations, "Tick loop stopped");
    iterations
}

/// Settings for the synthetic GC pause generator
#[derive(Debug, Clone)]
pub struct GcSimConfig {
    pub every: Duration,
    pub pause: Duration,
}

/// Request synthetic GC pauses from the tick loop until shutdown
pub async fn run_gc_simulator(
    config: GcSimConfig,
    pauses: Arc<PauseInjector>,
    mut shutdown: broadcast::Receiver<()>,
) -> u64 {
    info!(
        every_ms = config.every.as_millis() as u64,
        pause_ms = config.pause.as_millis() as u64,
        "Starting GC pause simulator"
    );

    let mut ticker = interval(config.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately
    ticker.tick().await;

    let mut collections = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                collections += 1;
                let (action, pause) = if collections % MAJOR_GC_EVERY == 0 {
                    (MAJOR_GC_ACTION, config.pause * MAJOR_GC_FACTOR as u32)
                } else {
                    (MINOR_GC_ACTION, config.pause)
                };

                pauses.request(action, pause);
            }
            _ = shutdown.recv() => {
                info!(collections = collections, "Shutting down GC pause simulator");
                break;
            }
        }
    }

    collections
}

/// Generate a random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    // Time-based, good enough to break up perfectly regular ticks
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}
