//! Human-readable single-line formatter

use crate::core::log_entry::escape_control;
use crate::core::{Formatter, LogEntry, LogLevel, Renderable, TimestampFormat};

/// `[ts] [LEVEL] name - message k=v ... {data}`
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::{Formatter, LogEntry, LogLevel};
/// use rust_log_pipeline::formatters::TextFormatter;
///
/// let line = TextFormatter::new()
///     .format(&LogEntry::new(LogLevel::Info, "ready").with_logger_name("api"))
///     .to_text();
/// assert!(line.ends_with("[INFO ] api - ready"));
/// ```
#[derive(Debug, Clone)]
pub struct TextFormatter {
    timestamp_format: TimestampFormat,
    use_colors: bool,
    show_call_site: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self {
            timestamp_format: TimestampFormat::default(),
            use_colors: false,
            show_call_site: true,
        }
    }

    /// Colored level labels; ignored without the `console` feature
    #[must_use]
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    #[must_use]
    pub fn with_call_site(mut self, show: bool) -> Self {
        self.show_call_site = show;
        self
    }

    fn level_label(&self, entry: &LogEntry) -> String {
        let label = format!("{:5}", entry.level.to_str());
        if self.use_colors {
            colorize(label, entry.level)
        } else {
            label
        }
    }
}

#[cfg(feature = "console")]
fn colorize(label: String, level: LogLevel) -> String {
    use colored::Colorize;
    label.color(level.color_code()).to_string()
}

#[cfg(not(feature = "console"))]
fn colorize(label: String, _level: LogLevel) -> String {
    label
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for TextFormatter {
    fn format(&self, entry: &LogEntry) -> Renderable {
        let mut line = format!(
            "[{}] [{}] {} - {}",
            self.timestamp_format.format(&entry.timestamp),
            self.level_label(entry),
            escape_control(entry.source_name()),
            entry.message
        );

        if !entry.context.is_empty() {
            line.push(' ');
            line.push_str(&entry.context.format_fields());
        }
        if let Some(ref data) = entry.data {
            line.push(' ');
            line.push_str(&data.to_string());
        }
        if self.show_call_site {
            if let Some(site) = entry.call_site.as_ref().and_then(|site| site.short()) {
                line.push_str(" @ ");
                line.push_str(&site);
            }
        }

        Renderable::Text(line)
    }

    fn name(&self) -> &str {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogContext;
    use crate::utils::CallSite;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn entry() -> LogEntry {
        let ts = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).single().unwrap();
        LogEntry::at(ts, LogLevel::Warn, "disk low").with_logger_name("storage")
    }

    #[test]
    fn test_basic_line() {
        let text = TextFormatter::new().format(&entry()).to_text();
        assert_eq!(text, "[2025-01-08T10:30:45.000Z] [WARN ] storage - disk low");
    }

    #[test]
    fn test_context_and_data_appended() {
        let entry = entry()
            .with_context(LogContext::new().with_field("volume", "/var").with_request_id("r1"))
            .with_data(json!({"free_mb": 12}));
        let text = TextFormatter::new().format(&entry).to_text();
        assert!(text.contains("volume=/var"));
        assert!(text.contains("request_id=r1"));
        assert!(text.ends_with("{\"free_mb\":12}"));
    }

    #[test]
    fn test_field_values_stay_on_one_line() {
        let entry = entry()
            .with_context(
                LogContext::new()
                    .with_field("user", "bob\n[2025] [ERROR] forged")
                    .with_session_id("s\r\n2"),
            )
            .with_data(json!({"note": "a\nb"}));
        let text = TextFormatter::new().format(&entry).to_text();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains(r"user=bob\n[2025] [ERROR] forged"));
        assert!(text.contains(r"session_id=s\r\n2"));
    }

    #[test]
    fn test_call_site_suffix() {
        let entry = entry().with_call_site(CallSite {
            function: None,
            file: Some("src/main.rs".into()),
            line: Some(7),
            column: None,
        });
        let formatter = TextFormatter::new();
        assert!(formatter.format(&entry).to_text().ends_with(" @ src/main.rs:7"));

        let hidden = formatter.with_call_site(false).format(&entry).to_text();
        assert!(!hidden.contains('@'));
    }

    #[test]
    fn test_custom_timestamp() {
        let text = TextFormatter::new()
            .with_timestamp_format(TimestampFormat::Time)
            .format(&entry())
            .to_text();
        assert!(text.starts_with("[10:30:45.000]"));
    }
}
