//! Console rendering of monitor messages

use clap::ValueEnum;
use colored::Colorize;
use serde::Deserialize;
use tickmon_lib::{MessageLevel, MessageSink, MonitorMessage, Style};

/// Output format for monitor messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored text (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Sink printing messages to stdout
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl MessageSink for ConsoleSink {
    fn send(&self, message: &MonitorMessage) {
        match render(message, self.format) {
            Some(line) => println!("{}", line),
            None => tracing::warn!(event = %message.event, "Failed to render message"),
        }
    }
}

/// Render a message in the given format
pub fn render(message: &MonitorMessage, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Text => Some(render_text(message)),
        OutputFormat::Json => serde_json::to_string(message).ok(),
    }
}

fn render_text(message: &MonitorMessage) -> String {
    let prefix = match message.level {
        MessageLevel::Alert => "⚠".yellow().bold(),
        MessageLevel::Info => "ℹ".blue().bold(),
    };

    let body: String = message
        .segments
        .iter()
        .map(|segment| match segment.style {
            Style::Plain => segment.text.normal().to_string(),
            Style::Highlight => segment.text.yellow().to_string(),
            Style::Muted => segment.text.bright_black().to_string(),
            Style::Warning => segment.text.red().to_string(),
        })
        .collect();

    format!("{} {}", prefix, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickmon_lib::MonitorEvent;

    fn sample() -> MonitorMessage {
        MonitorMessage::builder(MessageLevel::Alert, MonitorEvent::SlowTick)
            .text("Tick ")
            .styled("#7", Style::Muted)
            .text(" lasted ")
            .styled("80", Style::Highlight)
            .text(" ms.")
            .field("duration_ms", 80.0)
            .build()
    }

    #[test]
    fn test_render_text_without_colors() {
        colored::control::set_override(false);
        let line = render(&sample(), OutputFormat::Text).unwrap();
        assert_eq!(line, "⚠ Tick #7 lasted 80 ms.");
    }

    #[test]
    fn test_render_json() {
        let line = render(&sample(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["event"], "slow_tick");
        assert_eq!(value["level"], "alert");
        assert_eq!(value["fields"]["duration_ms"], 80.0);
    }
}
