//! Fixed-window rate limiting
//!
//! Each key gets a counter and a reset deadline. Bursts up to twice the cap
//! are possible across a window boundary; bookkeeping stays O(1) per key.

use super::environment::{Clock, SystemClock};
use super::log_level::LogLevel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_KEY: &str = "default";

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Duration,
}

/// Per-key fixed-window counter
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::RateLimiter;
/// use std::time::Duration;
///
/// let limiter = RateLimiter::new(2, Duration::from_secs(1));
/// assert!(limiter.is_allowed("k"));
/// assert!(limiter.is_allowed("k"));
/// assert!(!limiter.is_allowed("k"));
/// ```
pub struct RateLimiter {
    max: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self::with_clock(max, window, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(max: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one event for `key` and report whether it fits the window
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = self.clock.monotonic();
        let mut windows = self.windows.lock();

        if let Some(window) = windows.get_mut(key) {
            if now < window.reset_at {
                if window.count < self.max {
                    window.count += 1;
                    return true;
                }
                return false;
            }
        }

        // first use, or the previous window expired
        windows.insert(
            key.to_string(),
            Window {
                count: 1,
                reset_at: now.checked_add(self.window).unwrap_or(Duration::MAX),
            },
        );
        self.max > 0
    }

    pub fn is_allowed_default(&self) -> bool {
        self.is_allowed(DEFAULT_KEY)
    }

    /// Events left for `key` in its current window
    pub fn remaining(&self, key: &str) -> u32 {
        let now = self.clock.monotonic();
        match self.windows.lock().get(key) {
            Some(window) if now < window.reset_at => self.max.saturating_sub(window.count),
            _ => self.max,
        }
    }

    /// Clear one key's window, or every window with `None`
    pub fn reset(&self, key: Option<&str>) {
        let mut windows = self.windows.lock();
        match key {
            Some(key) => {
                windows.remove(key);
            }
            None => windows.clear(),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}

/// Which key a logger charges each entry against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One shared budget for every entry
    #[default]
    Global,
    /// A separate budget per level
    PerLevel,
}

impl RateLimitScope {
    pub fn key_for(&self, level: LogLevel) -> &'static str {
        match self {
            RateLimitScope::Global => DEFAULT_KEY,
            RateLimitScope::PerLevel => level.as_key(),
        }
    }
}

/// Logger-level rate limiting options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max: u32,
    pub window: Duration,
    pub scope: RateLimitScope,
}

impl RateLimitConfig {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            scope: RateLimitScope::Global,
        }
    }

    #[must_use]
    pub fn per_level(mut self) -> Self {
        self.scope = RateLimitScope::PerLevel;
        self
    }
}
