//! Log entry structure

use super::log_context::LogContext;
use super::log_level::LogLevel;
use crate::utils::CallSite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Clone)]
struct ThreadInfo {
    id: String,
    name: Option<String>,
}

thread_local! {
    static THREAD_INFO: RefCell<Option<ThreadInfo>> = const { RefCell::new(None) };
}

/// Id and name of the calling thread, computed once per thread
fn current_thread() -> ThreadInfo {
    THREAD_INFO.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(|| {
                let thread = std::thread::current();
                ThreadInfo {
                    id: format!("{:?}", thread.id()),
                    name: thread.name().map(String::from),
                }
            })
            .clone()
    })
}

/// Escapes line breaks and tabs so rendered text stays on one line
pub(crate) fn escape_control(text: &str) -> String {
    if !text.contains(['\n', '\r', '\t']) {
        return text.to_string();
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Immutable record handed to formatters and transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Sanitized payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "LogContext::is_empty")]
    pub context: LogContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_site: Option<CallSite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl AsRef<str>) -> Self {
        Self::at(Utc::now(), level, message)
    }

    pub fn at(timestamp: DateTime<Utc>, level: LogLevel, message: impl AsRef<str>) -> Self {
        let thread = current_thread();
        Self {
            timestamp,
            level,
            message: escape_control(message.as_ref()),
            data: None,
            context: LogContext::new(),
            call_site: None,
            request_id: None,
            session_id: None,
            logger: None,
            thread_id: thread.id,
            thread_name: thread.name,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach the merged context; correlation ids are lifted from it
    pub fn with_context(mut self, context: LogContext) -> Self {
        self.request_id = context.request_id().map(String::from);
        self.session_id = context.session_id().map(String::from);
        self.context = context;
        self
    }

    pub fn with_call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger = Some(name.into());
        self
    }

    /// Logger name, falling back to the thread name or id
    pub fn source_name(&self) -> &str {
        self.logger
            .as_deref()
            .or(self.thread_name.as_deref())
            .unwrap_or(&self.thread_id)
    }
}
