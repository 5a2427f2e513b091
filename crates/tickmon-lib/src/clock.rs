//! Monotonic time sources for tick measurement

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic clock reporting milliseconds as a float
pub trait Clock: Send + Sync {
    /// Current time in milliseconds with sub-millisecond precision
    fn now_millis(&self) -> f64;
}

/// Clock backed by [`Instant`], measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock whose time is set explicitly
///
/// Useful for hosts that already track their own loop time and for
/// deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: f64) -> Self {
        Self {
            millis_bits: AtomicU64::new(start_millis.to_bits()),
        }
    }

    /// Set the current time
    pub fn set(&self, millis: f64) {
        self.millis_bits.store(millis.to_bits(), Ordering::SeqCst);
    }

    /// Move time forward and return the new reading
    pub fn advance(&self, millis: f64) -> f64 {
        let mut current = self.millis_bits.load(Ordering::SeqCst);
        loop {
            let next = f64::from_bits(current) + millis;
            match self.millis_bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> f64 {
        f64::from_bits(self.millis_bits.load(Ordering::SeqCst))
    }
}
