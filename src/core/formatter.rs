//! Formatter trait: pure rendering of a log entry

use super::log_entry::LogEntry;
use serde::Serialize;
use std::fmt;

/// Sink-appropriate representation of an entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Renderable {
    /// Line-oriented text for consoles, files and streams
    Text(String),
    /// Structured object for JSON-based sinks
    Structured(serde_json::Value),
}

impl Renderable {
    /// Text form; structured values are rendered as compact JSON
    pub fn to_text(&self) -> String {
        match self {
            Renderable::Text(text) => text.clone(),
            Renderable::Structured(value) => value.to_string(),
        }
    }

    /// Structured form; text becomes a JSON string
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Renderable::Text(text) => serde_json::Value::String(text.clone()),
            Renderable::Structured(value) => value.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Renderable::Text(text) => Some(text),
            Renderable::Structured(_) => None,
        }
    }
}

impl fmt::Display for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Text(text) => f.write_str(text),
            Renderable::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// Renders a [`LogEntry`]; must be free of side effects
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::{Formatter, LogEntry, Renderable};
///
/// struct MessageOnly;
///
/// impl Formatter for MessageOnly {
///     fn format(&self, entry: &LogEntry) -> Renderable {
///         Renderable::Text(entry.message.clone())
///     }
///
///     fn name(&self) -> &str {
///         "message_only"
///     }
/// }
/// ```
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> Renderable;

    fn name(&self) -> &str;
}
