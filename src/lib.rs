//! # Rust Log Pipeline
//!
//! A structured logging engine: entries are filtered by level, enriched with
//! context, sanitized, rendered by a formatter and fanned out to any number
//! of transports.
//!
//! ## Features
//!
//! - **Eight levels**: `silent` to `silly`, numeric ordering, parse from names or numbers
//! - **Scoped context**: request/session ids, fields, metadata and timing per logger
//! - **Safe payloads**: sensitive keys redacted, cycles and depth bounded
//! - **Pluggable output**: text, JSON and logfmt formatters; console, file,
//!   stream, memory and HTTP transports
//! - **Batched delivery**: an async queue with ordered retry of failed batches
//! - **Rate limiting**: fixed window, global or per level
//!
//! ## Example
//!
//! ```
//! use rust_log_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! let memory = Arc::new(MemoryTransport::new());
//! let logger = Logger::builder()
//!     .level(LogLevel::Info)
//!     .name("api")
//!     .shared_transport(memory.clone())
//!     .build();
//!
//! let request = logger.child(LogContext::new().with_request_id("req-7"));
//! request.info_with("login", Loggable::map([("user", "alice"), ("password", "hunter2")]));
//!
//! let entry = memory.last().unwrap().entry;
//! assert_eq!(entry.request_id.as_deref(), Some("req-7"));
//! assert_eq!(entry.data.as_ref().unwrap()["password"], "[REDACTED]");
//! ```

pub mod core;
pub mod formatters;
pub mod macros;
pub mod transports;
pub mod utils;

pub mod prelude {
    pub use crate::core::{
        ContextGuard, DispatchMode, Environment, FormattedEntry, Formatter, LocationCapture,
        LogContext, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerConfig, LoggerError,
        LoggerMetrics, LoggerSettings, RateLimitConfig, RateLimitScope, Renderable, Result,
        Runtime, TimestampFormat, Transport,
    };
    pub use crate::formatters::{JsonFormatter, LogfmtFormatter, OutputFormat, TextFormatter};
    pub use crate::transports::{ConsoleTransport, MemoryTransport, MultiTransport, NullTransport};
    pub use crate::utils::{Loggable, Timer};
}

pub use core::{LogContext, LogEntry, LogLevel, Logger, LoggerBuilder, LoggerError, Result};
