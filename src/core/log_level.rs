//! Log level definitions
//!
//! Higher numeric value means more verbose. `Silent` is only a threshold:
//! a logger configured with it emits nothing.

use super::error::LoggerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silent = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
    Http = 4,
    Verbose = 5,
    Debug = 6,
    Silly = 7,
}

impl LogLevel {
    /// Every emitting level, most severe first
    pub const EMITTING: [LogLevel; 7] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Http,
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Silly,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Silent => "SILENT",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Http => "HTTP",
            LogLevel::Verbose => "VERBOSE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Silly => "SILLY",
        }
    }

    /// Lowercase name, used as the rate limiting key and in JSON output
    pub fn as_key(&self) -> &'static str {
        match self {
            LogLevel::Silent => "silent",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Http => "http",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Silly => "silly",
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Silent),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Http),
            5 => Some(LogLevel::Verbose),
            6 => Some(LogLevel::Debug),
            7 => Some(LogLevel::Silly),
            _ => None,
        }
    }

    /// Whether an entry at `target` passes a logger configured at `current`
    #[inline]
    pub fn should_log(current: LogLevel, target: LogLevel) -> bool {
        if current == LogLevel::Silent || target == LogLevel::Silent {
            return false;
        }
        target <= current
    }

    #[cfg(feature = "console")]
    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self {
            LogLevel::Silent => White,
            LogLevel::Error => Red,
            LogLevel::Warn => Yellow,
            LogLevel::Info => Green,
            LogLevel::Http => Cyan,
            LogLevel::Verbose => Magenta,
            LogLevel::Debug => Blue,
            LogLevel::Silly => BrightBlack,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<u8>() {
            return LogLevel::from_u8(n).ok_or_else(|| LoggerError::invalid_level(s));
        }

        match trimmed.to_uppercase().as_str() {
            "SILENT" | "OFF" | "NONE" => Ok(LogLevel::Silent),
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "HTTP" => Ok(LogLevel::Http),
            "VERBOSE" => Ok(LogLevel::Verbose),
            "DEBUG" => Ok(LogLevel::Debug),
            "SILLY" | "TRACE" => Ok(LogLevel::Silly),
            _ => Err(LoggerError::invalid_level(s)),
        }
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = LoggerError;

    fn try_from(value: u8) -> Result<Self, LoggerError> {
        LogLevel::from_u8(value).ok_or_else(|| LoggerError::invalid_level(value.to_string()))
    }
}
