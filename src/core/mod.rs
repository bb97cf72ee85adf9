//! Core logger types and traits

pub mod async_queue;
pub mod config;
pub mod environment;
pub mod error;
pub mod formatter;
pub mod log_context;
pub mod log_entry;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod rate_limiter;
pub mod timestamp;
pub mod transport;

pub use async_queue::{
    AsyncQueue, BatchProcessor, ErrorCallback, FlushOutcome, DEFAULT_MAX_DRAIN_FAILURES,
};
pub use config::{
    DispatchMode, LocationCapture, LoggerConfig, LoggerSettings, RateLimitSettings,
    DEFAULT_BACKGROUND_BUFFER, LEVEL_VAR,
};
pub use environment::{Clock, Environment, ManualClock, Runtime, SystemClock, ENVIRONMENT_VAR};
pub use error::{LoggerError, Result};
pub use formatter::{Formatter, Renderable};
pub use log_context::{ContextGuard, ContextStack, LogContext};
pub use log_entry::LogEntry;
pub use log_level::LogLevel;
pub use logger::{Logger, LoggerBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use metrics::{LoggerMetrics, MetricsSnapshot};
pub use rate_limiter::{RateLimitConfig, RateLimitScope, RateLimiter};
pub use timestamp::TimestampFormat;
pub use transport::{FormattedEntry, SharedTransport, Transport};
