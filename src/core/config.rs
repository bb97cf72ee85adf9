//! Logger configuration: programmatic config, file settings and the
//! environment entry point

use super::environment::{Clock, Environment, Runtime, SystemClock};
use super::error::{LoggerError, Result};
use super::formatter::Formatter;
use super::log_context::LogContext;
use super::log_level::LogLevel;
use super::rate_limiter::{RateLimitConfig, RateLimitScope};
use super::timestamp::TimestampFormat;
use super::transport::SharedTransport;
use crate::formatters::{OutputFormat, TextFormatter};
use crate::transports::ConsoleTransport;
use crate::utils::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Overrides the environment's default level
pub const LEVEL_VAR: &str = "LOG_LEVEL";

/// Default capacity of the background dispatch buffer
pub const DEFAULT_BACKGROUND_BUFFER: usize = 1024;

/// Where transports are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// On the calling thread, before `log` returns
    #[default]
    Sync,
    /// On one worker thread fed by a bounded FIFO buffer
    Background { buffer: usize },
}

impl DispatchMode {
    /// Background dispatch with the default buffer
    pub fn background() -> Self {
        DispatchMode::Background {
            buffer: DEFAULT_BACKGROUND_BUFFER,
        }
    }
}

/// Call-site capture for each entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCapture {
    #[default]
    Off,
    /// File, line and column of the logging call
    Caller,
    /// Full backtrace walk; needs `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE`
    Backtrace { skip: usize },
}

/// Everything a [`Logger`](super::Logger) is built from
#[derive(Clone)]
pub struct LoggerConfig {
    /// Explicit level; `None` uses the environment's default
    pub level: Option<LogLevel>,
    pub transports: Vec<SharedTransport>,
    pub formatter: Arc<dyn Formatter>,
    pub context: LogContext,
    pub name: Option<String>,
    pub capture_location: LocationCapture,
    pub rate_limit: Option<RateLimitConfig>,
    pub max_depth: usize,
    pub environment: Environment,
    pub runtime: Runtime,
    /// Receives reports about failing transports
    pub fallback: Option<SharedTransport>,
    pub dispatch: DispatchMode,
    pub clock: Arc<dyn Clock>,
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self {
            level: None,
            transports: Vec::new(),
            formatter: Arc::new(TextFormatter::new()),
            context: LogContext::new(),
            name: None,
            capture_location: LocationCapture::Off,
            rate_limit: None,
            max_depth: DEFAULT_MAX_DEPTH,
            environment: Environment::Development,
            runtime: Runtime::Server,
            fallback: None,
            dispatch: DispatchMode::Sync,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn effective_level(&self) -> LogLevel {
        self.level
            .unwrap_or_else(|| self.environment.default_level())
    }

    /// Console configuration from `APP_ENV` and `LOG_LEVEL`
    ///
    /// Fails when `LOG_LEVEL` is set to something that is not a level.
    pub fn from_env() -> Result<Self> {
        let app_env = std::env::var(super::environment::ENVIRONMENT_VAR).ok();
        let level = std::env::var(LEVEL_VAR).ok();
        Self::from_vars(app_env.as_deref(), level.as_deref())
    }

    /// [`LoggerConfig::from_env`] over explicit values
    pub fn from_vars(app_env: Option<&str>, log_level: Option<&str>) -> Result<Self> {
        let environment = Environment::from_signal(app_env);
        let runtime = Runtime::detect();
        let level = match log_level.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(raw.parse::<LogLevel>()?),
            None => None,
        };

        // machine-readable output where logs are usually shipped
        let format = if environment.is_production() {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };
        let colors = !environment.is_production() && environment != Environment::Test;

        let mut config = Self::new();
        config.level = level;
        config.environment = environment;
        config.runtime = runtime;
        config.formatter = format.formatter(colors, TimestampFormat::default());
        config.transports = vec![Arc::new(ConsoleTransport::new()) as SharedTransport];
        Ok(config)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("level", &self.effective_level())
            .field(
                "transports",
                &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("formatter", &self.formatter.name())
            .field("name", &self.name)
            .field("capture_location", &self.capture_location)
            .field("rate_limit", &self.rate_limit)
            .field("max_depth", &self.max_depth)
            .field("environment", &self.environment)
            .field("runtime", &self.runtime)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Rate limit section of [`LoggerSettings`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max: u32,
    pub window_ms: u64,
    #[serde(default)]
    pub scope: RateLimitScope,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        RateLimitConfig {
            max: settings.max,
            window: Duration::from_millis(settings.window_ms),
            scope: settings.scope,
        }
    }
}

/// Declarative settings, e.g. loaded from a JSON config file
///
/// Every field is optional; unset fields leave the builder untouched.
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::{LoggerSettings, Logger};
///
/// let settings = LoggerSettings::from_json(r#"{
///     "level": "verbose",
///     "format": "logfmt",
///     "rate_limit": { "max": 100, "window_ms": 1000, "scope": "per_level" }
/// }"#).unwrap();
///
/// let logger = Logger::builder().settings(&settings).unwrap().build();
/// assert_eq!(logger.level(), rust_log_pipeline::core::LogLevel::Verbose);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerSettings {
    /// Level name or number, parsed like `LOG_LEVEL`
    pub level: Option<String>,
    pub format: Option<OutputFormat>,
    pub colors: Option<bool>,
    pub timestamp: Option<TimestampFormat>,
    pub name: Option<String>,
    pub capture_location: Option<LocationCapture>,
    pub max_depth: Option<usize>,
    pub rate_limit: Option<RateLimitSettings>,
    /// Background dispatch buffer; absent means synchronous dispatch
    pub background_buffer: Option<usize>,
}

impl LoggerSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn parsed_level(&self) -> Result<Option<LogLevel>> {
        self.level.as_deref().map(str::parse).transpose()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref limit) = self.rate_limit {
            if limit.window_ms == 0 {
                return Err(LoggerError::config(
                    "rate_limit",
                    "window_ms must be greater than zero",
                ));
            }
        }
        if self.background_buffer == Some(0) {
            return Err(LoggerError::config(
                "background_buffer",
                "buffer must hold at least one entry",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = LoggerConfig::from_vars(None, None).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.effective_level(), LogLevel::Debug);
        assert_eq!(config.transports.len(), 1);
        assert_eq!(config.formatter.name(), "text");
    }

    #[test]
    fn test_from_vars_production() {
        let config = LoggerConfig::from_vars(Some("PROD"), None).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.effective_level(), LogLevel::Info);
        assert_eq!(config.formatter.name(), "json");
    }

    #[test]
    fn test_level_override_and_failure() {
        let config = LoggerConfig::from_vars(Some("test"), Some("silly")).unwrap();
        assert_eq!(config.effective_level(), LogLevel::Silly);

        let err = LoggerConfig::from_vars(None, Some("loud")).unwrap_err();
        assert!(matches!(err, LoggerError::InvalidLevel { ref input } if input == "loud"));
    }

    #[test]
    fn test_blank_level_is_ignored() {
        let config = LoggerConfig::from_vars(Some("staging"), Some("  ")).unwrap();
        assert_eq!(config.effective_level(), LogLevel::Http);
    }

    #[test]
    fn test_settings_parse() {
        let settings = LoggerSettings::from_json(
            r#"{
                "level": "WARNING",
                "format": "json",
                "capture_location": "caller",
                "max_depth": 5,
                "rate_limit": {"max": 10, "window_ms": 500}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.parsed_level().unwrap(), Some(LogLevel::Warn));
        assert_eq!(settings.format, Some(OutputFormat::Json));
        assert_eq!(settings.capture_location, Some(LocationCapture::Caller));

        let limit = RateLimitConfig::from(settings.rate_limit.as_ref().unwrap());
        assert_eq!(limit.window, Duration::from_millis(500));
        assert_eq!(limit.scope, RateLimitScope::Global);
    }

    #[test]
    fn test_settings_backtrace_capture() {
        let settings =
            LoggerSettings::from_json(r#"{"capture_location": {"backtrace": {"skip": 2}}}"#)
                .unwrap();
        assert_eq!(
            settings.capture_location,
            Some(LocationCapture::Backtrace { skip: 2 })
        );
    }

    #[test]
    fn test_settings_reject_unknown_and_invalid() {
        assert!(LoggerSettings::from_json(r#"{"colour": true}"#).is_err());

        let settings = LoggerSettings::from_json(r#"{"level": "nope"}"#).unwrap();
        assert!(settings.parsed_level().is_err());

        let settings =
            LoggerSettings::from_json(r#"{"rate_limit": {"max": 1, "window_ms": 0}}"#).unwrap();
        assert!(settings.validate().is_err());
    }
}
