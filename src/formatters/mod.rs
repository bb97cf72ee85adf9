//! Formatter implementations

pub mod json;
pub mod logfmt;
pub mod text;

pub use json::JsonFormatter;
pub use logfmt::LogfmtFormatter;
pub use text::TextFormatter;

use crate::core::{Formatter, LoggerError, TimestampFormat};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Built-in output formats, selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[2025-01-08T10:30:45.000Z] [INFO ] api - Request processed`
    #[default]
    Text,
    /// `{"timestamp":"2025-01-08T10:30:45.000Z","level":"info",...}`
    Json,
    /// `ts=2025-01-08T10:30:45.000Z level=info msg="Request processed"`
    Logfmt,
}

impl OutputFormat {
    /// Build the matching formatter; `colors` only affects text
    pub fn formatter(&self, colors: bool, timestamp: TimestampFormat) -> Arc<dyn Formatter> {
        match self {
            OutputFormat::Text => Arc::new(
                TextFormatter::new()
                    .with_colors(colors)
                    .with_timestamp_format(timestamp),
            ),
            OutputFormat::Json => Arc::new(JsonFormatter::new().with_timestamp_format(timestamp)),
            OutputFormat::Logfmt => {
                Arc::new(LogfmtFormatter::new().with_timestamp_format(timestamp))
            }
        }
    }
}

impl FromStr for OutputFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "logfmt" => Ok(OutputFormat::Logfmt),
            other => Err(LoggerError::config(
                "OutputFormat",
                format!("unknown format '{}' (expected text, json or logfmt)", other),
            )),
        }
    }
}
