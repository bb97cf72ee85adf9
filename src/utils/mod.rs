//! Payload sanitizing, call-site inspection and timing helpers

pub mod performance;
pub mod sanitizer;
pub mod stack;

pub use performance::{format_bytes, format_duration, PerformanceEntry, Timer};
pub use sanitizer::{
    is_sensitive_key, sanitize, Loggable, SharedValue, CIRCULAR, DEFAULT_MAX_DEPTH,
    MAX_DEPTH_REACHED, REDACTED,
};
pub use stack::{CallSite, Frame, StackInspector};
