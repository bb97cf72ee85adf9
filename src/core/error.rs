//! Error types for the logging pipeline

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Unrecognized level name or number
    #[error("Invalid log level: '{input}' (expected one of silent, error, warn, info, http, verbose, debug, silly or 0-7)")]
    InvalidLevel { input: String },

    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Filesystem failure, with what was being done and to which path
    #[error("IO error while {operation} ({path}): {source}")]
    IoOperation {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Settings or payload that is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport rejected a write
    #[error("Transport '{name}' failed: {message}")]
    Transport { name: String, message: String },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// One or more sub-transports of a fan-out failed
    #[error("{} of the fan-out transports failed: {}", failures.len(), failures.join("; "))]
    Multi { failures: Vec<String> },

    /// A forced drain gave up while items were still queued
    #[error("Drain incomplete after {attempts} failed flushes: {remaining} items still queued")]
    DrainIncomplete { remaining: usize, attempts: usize },

    /// The background dispatcher has shut down
    #[error("Background dispatcher is no longer receiving entries")]
    QueueClosed,

    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    pub fn invalid_level(input: impl Into<String>) -> Self {
        LoggerError::InvalidLevel {
            input: input.into(),
        }
    }

    /// `component` names the builder or settings block that was rejected
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn io_operation(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn transport(name: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Transport {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }
}
