//! Garbage-collection pause events
//!
//! The host runtime reports pauses through a [`GcSource`]. Listeners are
//! held weakly so a subscription never keeps its owner alive.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Action string reported at the end of a young-generation collection
pub const MINOR_GC_ACTION: &str = "end of minor GC";

/// Action string reported at the end of an old-generation collection
pub const MAJOR_GC_ACTION: &str = "end of major GC";

/// A single garbage-collection pause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcEvent {
    /// Pause duration in milliseconds
    pub duration_ms: f64,
    /// Action identifier as reported by the runtime
    pub action: String,
}

impl GcEvent {
    pub fn new(duration_ms: f64, action: impl Into<String>) -> Self {
        Self {
            duration_ms,
            action: action.into(),
        }
    }

    pub fn kind(&self) -> GcKind {
        GcKind::from_action(&self.action)
    }
}

/// Normalised collection kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GcKind {
    Young,
    Old,
    Other(String),
}

impl GcKind {
    pub fn from_action(action: &str) -> Self {
        match action {
            MINOR_GC_ACTION => GcKind::Young,
            MAJOR_GC_ACTION => GcKind::Old,
            other => GcKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for GcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcKind::Young => write!(f, "Young Gen"),
            GcKind::Old => write!(f, "Old Gen"),
            GcKind::Other(action) => write!(f, "{}", action),
        }
    }
}

/// Receives GC pause notifications
pub trait GcListener: Send + Sync {
    fn on_gc(&self, event: &GcEvent);
}

/// Something that reports GC pauses to listeners
pub trait GcSource: Send + Sync {
    fn subscribe(&self, listener: Weak<dyn GcListener>) -> GcSubscription;
}

/// Handle to an active GC subscription
///
/// Unsubscribing is idempotent; dropping the handle unsubscribes.
pub struct GcSubscription {
    released: AtomicBool,
    release: Option<Box<dyn Fn() + Send + Sync>>,
}

impl GcSubscription {
    /// Create a subscription that runs `release` once when unsubscribed
    pub fn new(release: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            released: AtomicBool::new(false),
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release
    pub fn detached() -> Self {
        Self {
            released: AtomicBool::new(false),
            release: None,
        }
    }

    /// Stop receiving events. Returns false if already unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(release) = &self.release {
            release();
        }
        true
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }
}

impl Drop for GcSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for GcSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<u64, Weak<dyn GcListener>>>,
}

/// In-process [`GcSource`] fed by the host via [`GcEventBus::publish`]
#[derive(Clone, Default)]
pub struct GcEventBus {
    inner: Arc<BusInner>,
}

impl GcEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every live listener on the calling thread
    ///
    /// Listeners whose owner has been dropped are pruned.
    pub fn publish(&self, event: &GcEvent) {
        let listeners: Vec<(u64, Weak<dyn GcListener>)> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, listener) in listeners {
            match listener.upgrade() {
                Some(listener) => listener.on_gc(event),
                None => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut map = self
                .inner
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in &dead {
                map.remove(id);
            }
            debug!(pruned = dead.len(), "Pruned dropped GC listeners");
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl GcSource for GcEventBus {
    fn subscribe(&self, listener: Weak<dyn GcListener>) -> GcSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);

        let bus = Arc::downgrade(&self.inner);
        GcSubscription::new(move || {
            if let Some(bus) = bus.upgrade() {
                bus.listeners
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }
}
