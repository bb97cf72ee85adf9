//! Structured logging context
//!
//! This module provides:
//! - `LogContext`: key/value fields plus the reserved `metadata` and `timing`
//!   sections and the correlation identifiers
//! - `ContextStack`: scoped layers pushed on a logger
//! - `ContextGuard`: RAII guard that pops its layer when dropped

use super::log_entry::escape_control;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Context attached to a logger and inherited by its children
///
/// Merge rules:
/// - plain fields: later value wins per key
/// - `metadata`: merged key-wise, later value wins per key
/// - `timing`: replaced wholesale by the most recent value
/// - `request_id` / `session_id`: later value wins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogContext {
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timing: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl LogContext {
    /// Create a new empty log context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the context
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.add_field(key, value);
        self
    }

    /// Add a field to the context (mutable version)
    ///
    /// The reserved names `metadata`, `timing`, `request_id` and `session_id`
    /// are routed to their dedicated sections.
    pub fn add_field<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            "metadata" => match value {
                Value::Object(map) => self.metadata.extend(map),
                other => {
                    self.fields.insert(key, other);
                }
            },
            "timing" => self.timing = Some(value),
            "request_id" | "requestId" => self.request_id = Some(value_to_string(value)),
            "session_id" | "sessionId" => self.session_id = Some(value_to_string(value)),
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_timing(mut self, timing: impl Into<Value>) -> Self {
        self.timing = Some(timing.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn timing(&self) -> Option<&Value> {
        self.timing.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.metadata.is_empty()
            && self.timing.is_none()
            && self.request_id.is_none()
            && self.session_id.is_none()
    }

    /// Merge `other` on top of `self`, returning a new context
    #[must_use]
    pub fn merge(&self, other: &LogContext) -> LogContext {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    /// In-place variant of [`LogContext::merge`]
    pub fn merge_from(&mut self, other: &LogContext) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        if other.timing.is_some() {
            self.timing = other.timing.clone();
        }
        if other.request_id.is_some() {
            self.request_id = other.request_id.clone();
        }
        if other.session_id.is_some() {
            self.session_id = other.session_id.clone();
        }
    }

    /// Format fields as key=value pairs
    pub fn format_fields(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, display_value(v)))
            .collect();
        if let Some(ref id) = self.request_id {
            parts.push(format!("request_id={}", escape_control(id)));
        }
        if let Some(ref id) = self.session_id {
            parts.push(format!("session_id={}", escape_control(id)));
        }
        if !self.metadata.is_empty() {
            parts.push(format!("metadata={}", Value::Object(self.metadata.clone())));
        }
        if let Some(ref timing) = self.timing {
            parts.push(format!("timing={}", timing));
        }
        parts.join(" ")
    }

    /// Render the whole context as one JSON object
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_fields())
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Strings are shown bare, everything else as compact JSON
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => escape_control(s),
        other => other.to_string(),
    }
}

/// Ordered layers of scoped context
///
/// Shared between a logger and the guards it hands out. Guards can be
/// dropped in any order; each removes only its own layer.
#[derive(Debug, Default)]
pub struct ContextStack {
    layers: RwLock<Vec<(u64, LogContext)>>,
    next_id: AtomicU64,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, context: LogContext) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.layers.write().push((id, context));
        id
    }

    fn remove(&self, id: u64) {
        self.layers.write().retain(|(layer_id, _)| *layer_id != id);
    }

    pub fn depth(&self) -> usize {
        self.layers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.read().is_empty()
    }

    /// Merge every layer, oldest first, onto `base`
    pub fn apply_to(&self, base: &mut LogContext) {
        for (_, layer) in self.layers.read().iter() {
            base.merge_from(layer);
        }
    }
}

/// RAII guard for a scoped context layer
///
/// # Example
///
/// ```
/// use rust_log_pipeline::prelude::*;
///
/// let logger = Logger::builder().build();
/// {
///     let _guard = logger.push_context(LogContext::new().with_request_id("abc-123"));
///     logger.info("Processing request"); // carries request_id
/// }
/// // layer removed here
/// ```
#[must_use = "the context layer is removed as soon as the guard is dropped"]
pub struct ContextGuard {
    stack: Arc<ContextStack>,
    id: u64,
}

impl ContextGuard {
    pub(crate) fn push(stack: &Arc<ContextStack>, context: LogContext) -> Self {
        let id = stack.push(context);
        Self {
            stack: Arc::clone(stack),
            id,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.stack.remove(self.id);
    }
}
