//! Structured JSON formatter

use crate::core::{Formatter, LogEntry, Renderable, TimestampFormat};
use serde_json::{Map, Value};

/// One JSON object per entry
///
/// Produces [`Renderable::Structured`] by default so JSON sinks can batch
/// objects; `as_text` or `pretty` switch to serialized text for line sinks.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    timestamp_format: TimestampFormat,
    text: bool,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Emit compact JSON text instead of a structured value
    #[must_use]
    pub fn as_text(mut self) -> Self {
        self.text = true;
        self
    }

    /// Emit indented JSON text
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.text = true;
        self.pretty = true;
        self
    }

    /// The object this formatter renders for `entry`
    pub fn to_value(&self, entry: &LogEntry) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "timestamp".to_string(),
            self.timestamp_format.to_value(&entry.timestamp),
        );
        obj.insert("level".to_string(), Value::from(entry.level.as_key()));
        obj.insert("message".to_string(), Value::from(entry.message.clone()));

        if let Some(ref name) = entry.logger {
            obj.insert("logger".to_string(), Value::from(name.clone()));
        }
        if let Some(ref id) = entry.request_id {
            obj.insert("request_id".to_string(), Value::from(id.clone()));
        }
        if let Some(ref id) = entry.session_id {
            obj.insert("session_id".to_string(), Value::from(id.clone()));
        }
        if !entry.context.is_empty() {
            obj.insert("context".to_string(), entry.context.to_json_value());
        }
        if let Some(ref data) = entry.data {
            obj.insert("data".to_string(), data.clone());
        }
        if let Some(ref site) = entry.call_site {
            if let Ok(value) = serde_json::to_value(site) {
                obj.insert("call_site".to_string(), value);
            }
        }

        obj.insert("thread_id".to_string(), Value::from(entry.thread_id.clone()));
        if let Some(ref name) = entry.thread_name {
            obj.insert("thread_name".to_string(), Value::from(name.clone()));
        }

        Value::Object(obj)
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> Renderable {
        let value = self.to_value(entry);
        if !self.text {
            return Renderable::Structured(value);
        }
        let text = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        Renderable::Text(text.unwrap_or_else(|_| value.to_string()))
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogContext, LogLevel};
    use serde_json::json;

    #[test]
    fn test_structured_output() {
        let entry = LogEntry::new(LogLevel::Error, "Error occurred")
            .with_context(LogContext::new().with_field("latency_ms", 42).with_request_id("abc-123"))
            .with_data(json!({"code": 500}));

        let output = JsonFormatter::new().format(&entry);
        let Renderable::Structured(value) = output else {
            panic!("expected structured output");
        };
        assert_eq!(value["level"], "error");
        assert_eq!(value["message"], "Error occurred");
        assert_eq!(value["request_id"], "abc-123");
        assert_eq!(value["context"]["latency_ms"], 42);
        assert_eq!(value["data"]["code"], 500);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_text_output_parses_back() {
        let entry = LogEntry::new(LogLevel::Info, "ok");
        let text = JsonFormatter::new().as_text().format(&entry).to_text();
        assert!(!text.contains('\n'));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["message"], "ok");

        let pretty = JsonFormatter::new().pretty().format(&entry).to_text();
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn test_numeric_timestamp() {
        let entry = LogEntry::new(LogLevel::Info, "ok");
        let value = JsonFormatter::new()
            .with_timestamp_format(TimestampFormat::UnixMillis)
            .to_value(&entry);
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_empty_sections_omitted() {
        let value = JsonFormatter::new().to_value(&LogEntry::new(LogLevel::Info, "bare"));
        assert!(value.get("context").is_none());
        assert!(value.get("data").is_none());
        assert!(value.get("request_id").is_none());
    }
}
