//! Delivery of monitor messages to an operator

use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use crate::models::{MessageLevel, MonitorEvent, MonitorMessage};

/// Renders or delivers a structured message
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &MonitorMessage);
}

/// Sink that writes every message to the `tracing` pipeline
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn send(&self, message: &MonitorMessage) {
        let fields = serde_json::to_string(&message.fields).unwrap_or_default();
        match message.level {
            MessageLevel::Alert => warn!(
                target: "tickmon::report",
                event = %message.event,
                fields = %fields,
                "{}",
                message.text()
            ),
            MessageLevel::Info => info!(
                target: "tickmon::report",
                event = %message.event,
                fields = %fields,
                "{}",
                message.text()
            ),
        }
    }
}

/// Sink that keeps every message in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<MonitorMessage>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every message received so far
    pub fn messages(&self) -> Vec<MonitorMessage> {
        self.lock().clone()
    }

    /// Messages of a single event kind
    pub fn of_event(&self, event: MonitorEvent) -> Vec<MonitorMessage> {
        self.lock()
            .iter()
            .filter(|m| m.event == event)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every message received so far
    pub fn drain(&self) -> Vec<MonitorMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MonitorMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSink for CollectingSink {
    fn send(&self, message: &MonitorMessage) {
        self.lock().push(message.clone());
    }
}
