//! Tick boundaries of the monitored loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Supplies the monotonically increasing tick counter
pub trait TickSource: Send + Sync {
    fn current_tick(&self) -> u64;
}

/// Invoked once per loop iteration, in loop order
pub trait TickCallback: Send + Sync {
    fn on_tick(&self, tick: u64);
}

/// Tick source driven by the host loop
///
/// The host calls [`TickHook::tick`] once per iteration; every registered
/// callback runs synchronously on the calling thread.
#[derive(Default)]
pub struct TickHook {
    counter: AtomicU64,
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, Arc<dyn TickCallback>)>>,
}

impl TickHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `start` instead of zero
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
            ..Self::default()
        }
    }

    /// Register a callback, returning an id for removal
    pub fn add_callback(&self, callback: Arc<dyn TickCallback>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Remove a callback. Returns false if the id is unknown.
    pub fn remove_callback(&self, id: u64) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Mark a tick boundary and notify callbacks
    pub fn tick(&self) -> u64 {
        let tick = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        let callbacks: Vec<Arc<dyn TickCallback>> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback.on_tick(tick);
        }
        tick
    }
}

impl TickSource for TickHook {
    fn current_tick(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, u64)>>>,
    }

    impl TickCallback for Recorder {
        fn on_tick(&self, tick: u64) {
            self.log.lock().unwrap().push((self.name, tick));
        }
    }

    #[test]
    fn test_tick_increments_counter() {
        let hook = TickHook::starting_at(40);
        assert_eq!(hook.current_tick(), 40);
        assert_eq!(hook.tick(), 41);
        assert_eq!(hook.tick(), 42);
        assert_eq!(hook.current_tick(), 42);
    }

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let hook = TickHook::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hook.add_callback(Arc::new(Recorder {
            name: "a",
            log: log.clone(),
        }));
        let b = hook.add_callback(Arc::new(Recorder {
            name: "b",
            log: log.clone(),
        }));

        hook.tick();
        assert!(hook.remove_callback(b));
        assert!(!hook.remove_callback(b));
        hook.tick();

        assert_eq!(*log.lock().unwrap(), vec![("a", 1), ("b", 1), ("a", 2)]);
    }
}
