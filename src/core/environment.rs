//! Clock and deployment environment
//!
//! Both are injected into the logger at construction time. The probes
//! (`Environment::detect`, `Runtime::detect`) exist for the application
//! entry point only.

use super::error::LoggerError;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Environment variable naming the deployment mode
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Source of wall-clock and monotonic time
pub trait Clock: Send + Sync {
    /// Wall-clock time for entry timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time since an arbitrary, fixed origin
    fn monotonic(&self) -> Duration;
}

/// Clock backed by the operating system
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven clock for deterministic tests
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.monotonic(), Duration::from_millis(250));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    elapsed_micros: AtomicU64,
    epoch: DateTime<Utc>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }

    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            elapsed_micros: AtomicU64::new(0),
            epoch,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.elapsed_micros.load(Ordering::SeqCst) as i64;
        self.epoch + chrono::Duration::microseconds(micros)
    }

    fn monotonic(&self) -> Duration {
        Duration::from_micros(self.elapsed_micros.load(Ordering::SeqCst))
    }
}

/// Deployment mode, used only to pick defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
    Staging,
}

impl Environment {
    /// Read [`ENVIRONMENT_VAR`]; absent or unrecognized values fall back to
    /// `Development`
    pub fn detect() -> Self {
        Self::from_signal(std::env::var(ENVIRONMENT_VAR).ok().as_deref())
    }

    pub fn from_signal(signal: Option<&str>) -> Self {
        signal
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Default threshold for this environment
    pub fn default_level(&self) -> LogLevel {
        match self {
            Environment::Production => LogLevel::Info,
            Environment::Staging => LogLevel::Http,
            Environment::Development => LogLevel::Debug,
            Environment::Test => LogLevel::Debug,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "staging" | "stage" => Ok(Environment::Staging),
            other => Err(LoggerError::config(
                "environment",
                format!("unknown deployment mode '{}'", other),
            )),
        }
    }
}

/// Kind of host process the logger runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    #[default]
    Server,
    Browser,
    Worker,
}

impl Runtime {
    /// Platform probe for the application boundary
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Runtime::Browser
        } else {
            Runtime::Server
        }
    }

    /// Whether the host can write to local files
    pub fn has_filesystem(&self) -> bool {
        matches!(self, Runtime::Server)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Server => "server",
            Runtime::Browser => "browser",
            Runtime::Worker => "worker",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.monotonic(), Duration::ZERO);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.monotonic(), Duration::from_millis(1500));
        assert_eq!(clock.now().timestamp_millis(), 1500);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.monotonic();
        let second = clock.monotonic();
        assert!(second >= first);
    }

    #[test]
    fn test_environment_from_signal() {
        assert_eq!(Environment::from_signal(Some("production")), Environment::Production);
        assert_eq!(Environment::from_signal(Some("STAGING")), Environment::Staging);
        assert_eq!(Environment::from_signal(Some("test")), Environment::Test);
        assert_eq!(Environment::from_signal(Some("nonsense")), Environment::Development);
        assert_eq!(Environment::from_signal(None), Environment::Development);
    }

    #[test]
    fn test_default_levels_more_verbose_outside_production() {
        let prod = Environment::Production.default_level();
        assert!(Environment::Development.default_level() > prod);
        assert!(Environment::Staging.default_level() > prod);
        assert!(Environment::Test.default_level() > prod);
        assert_eq!(prod, LogLevel::Info);
    }

    #[test]
    fn test_runtime_detect_on_host() {
        assert_eq!(Runtime::detect(), Runtime::Server);
        assert!(Runtime::Server.has_filesystem());
        assert!(!Runtime::Browser.has_filesystem());
    }
}
