//! logfmt formatter (`key=value` pairs)

use crate::core::{Formatter, LogEntry, Renderable, TimestampFormat};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct LogfmtFormatter {
    timestamp_format: TimestampFormat,
}

impl LogfmtFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }
}

fn escape_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn escape_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '"', '=', '\n', '\r', '\t']) {
        quote(value)
    } else {
        value.to_string()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => escape_value(s),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.to_string(),
        nested => quote(&nested.to_string()),
    }
}

impl Formatter for LogfmtFormatter {
    fn format(&self, entry: &LogEntry) -> Renderable {
        let mut parts = vec![
            format!(
                "ts={}",
                escape_value(&self.timestamp_format.format(&entry.timestamp))
            ),
            format!("level={}", entry.level.as_key()),
            format!("msg={}", quote(&entry.message)),
        ];

        if let Some(ref name) = entry.logger {
            parts.push(format!("logger={}", escape_value(name)));
        }
        if let Some(ref id) = entry.request_id {
            parts.push(format!("request_id={}", escape_value(id)));
        }
        if let Some(ref id) = entry.session_id {
            parts.push(format!("session_id={}", escape_value(id)));
        }
        for (key, value) in entry.context.fields() {
            parts.push(format!("{}={}", escape_key(key), render_value(value)));
        }
        for (key, value) in entry.context.metadata() {
            parts.push(format!("metadata.{}={}", escape_key(key), render_value(value)));
        }
        if let Some(timing) = entry.context.timing() {
            parts.push(format!("timing={}", render_value(timing)));
        }
        if let Some(ref data) = entry.data {
            parts.push(format!("data={}", render_value(data)));
        }
        if let Some(site) = entry.call_site.as_ref().and_then(|site| site.short()) {
            parts.push(format!("caller={}", escape_value(&site)));
        }

        Renderable::Text(parts.join(" "))
    }

    fn name(&self) -> &str {
        "logfmt"
    }
}
