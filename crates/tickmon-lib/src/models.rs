//! Core data models for the tick monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a message is informational or an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Alert,
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "info"),
            MessageLevel::Alert => write!(f, "alert"),
        }
    }
}

/// Event classification for monitor messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEvent {
    /// First tick seen, calibration is starting
    #[serde(rename = "monitor_started")]
    Started,
    /// Calibration finished, header line
    CalibrationComplete,
    /// One of the max/min/average lines after calibration
    CalibrationStat,
    /// Description of the active report predicate
    MonitoringPolicy,
    /// A tick exceeded the report predicate
    SlowTick,
    /// A garbage-collection pause was observed
    GcPause,
}

impl std::fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MonitorEvent::Started => "monitor_started",
            MonitorEvent::CalibrationComplete => "calibration_complete",
            MonitorEvent::CalibrationStat => "calibration_stat",
            MonitorEvent::MonitoringPolicy => "monitoring_policy",
            MonitorEvent::SlowTick => "slow_tick",
            MonitorEvent::GcPause => "gc_pause",
        };
        f.write_str(name)
    }
}

/// Rendering hint for a piece of message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Plain,
    /// Values the operator should notice (durations, percentages)
    Highlight,
    /// De-emphasised text such as tick numbers
    Muted,
    /// Warnings such as the GC marker
    Warning,
}

/// A styled piece of message text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::Plain,
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Structured text payload delivered to a message sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorMessage {
    pub level: MessageLevel,
    pub event: MonitorEvent,
    pub segments: Vec<Segment>,
    /// Numeric values carried by the message, keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl MonitorMessage {
    /// Start building a message
    pub fn builder(level: MessageLevel, event: MonitorEvent) -> MessageBuilder {
        MessageBuilder {
            message: MonitorMessage {
                level,
                event,
                segments: Vec::new(),
                fields: BTreeMap::new(),
                timestamp: Utc::now(),
            },
        }
    }

    /// Informational message consisting of a single plain segment
    pub fn info(event: MonitorEvent, text: impl Into<String>) -> Self {
        Self::builder(MessageLevel::Info, event).text(text).build()
    }

    /// Plain text rendering with styles dropped
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Look up a numeric field
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// Builder for [`MonitorMessage`]
#[derive(Debug)]
pub struct MessageBuilder {
    message: MonitorMessage,
}

impl MessageBuilder {
    /// Append a plain segment
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.message.segments.push(Segment::plain(text));
        self
    }

    /// Append a styled segment
    pub fn styled(mut self, text: impl Into<String>, style: Style) -> Self {
        self.message.segments.push(Segment::styled(text, style));
        self
    }

    /// Attach a numeric field
    pub fn field(mut self, name: &str, value: f64) -> Self {
        self.message.fields.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> MonitorMessage {
        self.message
    }
}

/// Format a number with at most two decimals, dropping trailing zeros
///
/// `80.0` renders as `80`, `60.5` as `60.5` and `12.3456` as `12.35`.
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(80.0), "80");
        assert_eq!(format_decimal(60.5), "60.5");
        assert_eq!(format_decimal(12.345_6), "12.35");
        assert_eq!(format_decimal(0.004), "0");
        assert_eq!(format_decimal(-0.001), "0");
        assert_eq!(format_decimal(-10.0), "-10");
        assert_eq!(format_decimal(100.10), "100.1");
    }

    #[test]
    fn test_message_text_concatenates_segments() {
        let message = MonitorMessage::builder(MessageLevel::Alert, MonitorEvent::SlowTick)
            .text("Tick ")
            .styled("#5", Style::Muted)
            .text(" lasted ")
            .styled("80", Style::Highlight)
            .text(" ms.")
            .field("duration_ms", 80.0)
            .build();

        assert_eq!(message.text(), "Tick #5 lasted 80 ms.");
        assert_eq!(message.field("duration_ms"), Some(80.0));
        assert_eq!(message.field("missing"), None);
    }

    #[test]
    fn test_message_serializes_with_snake_case_event() {
        let message = MonitorMessage::info(MonitorEvent::GcPause, "hello");
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["event"], "gc_pause");
        assert_eq!(json["level"], "info");
        assert!(json.get("fields").is_none());
    }
}
