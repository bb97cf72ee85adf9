//! Operation timing and human-readable sizes

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};

/// Local timer for one operation
///
/// # Example
///
/// ```
/// use rust_log_pipeline::utils::Timer;
///
/// let timer = Timer::start("load_config");
/// // ... work ...
/// let perf = timer.end();
/// assert_eq!(perf.label, "load_config");
/// ```
#[derive(Debug)]
pub struct Timer {
    label: String,
    started: Instant,
    memory_before: Option<u64>,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
            memory_before: resident_memory_bytes(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn end(self) -> PerformanceEntry {
        let duration = self.started.elapsed();
        let memory_delta = match (self.memory_before, resident_memory_bytes()) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };
        PerformanceEntry {
            label: self.label,
            duration,
            memory_delta,
        }
    }
}

/// Result of a finished [`Timer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub label: String,
    pub duration: Duration,
    /// Change in resident memory, in bytes, when the platform reports it
    pub memory_delta: Option<i64>,
}

impl PerformanceEntry {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Value stored in a context's `timing` section
    pub fn to_timing(&self) -> serde_json::Value {
        let mut timing = json!({
            "label": self.label,
            "duration_ms": self.duration_ms(),
            "duration": format_duration(self.duration_ms()),
        });
        if let Some(delta) = self.memory_delta {
            timing["memory_delta"] = json!(delta);
            let sign = if delta < 0 { "-" } else { "" };
            timing["memory"] = json!(format!("{}{}", sign, format_bytes(delta.unsigned_abs() as f64)));
        }
        timing
    }
}

/// Resident set size of this process; Linux only
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Format milliseconds with the unit ladder μs < ms < s < m < h
pub fn format_duration(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "0μs".to_string();
    }
    // unit is chosen on the rounded value so 0.9997ms never prints as 1000μs
    let micros = (ms * 1000.0).round();
    if micros < 1000.0 {
        return format!("{:.0}μs", micros);
    }
    let tenths = |value: f64| (value * 10.0).round() / 10.0;
    if tenths(ms) < 1_000.0 {
        format!("{:.1}ms", ms)
    } else if tenths(ms / 1_000.0) < 60.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else if tenths(ms / 60_000.0) < 60.0 {
        format!("{:.1}m", ms / 60_000.0)
    } else {
        format!("{:.1}h", ms / 3_600_000.0)
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if !bytes.is_finite() || bytes <= 0.0 {
        return "0 B".to_string();
    }
    if bytes < 1024.0 {
        return format!("{} B", bytes.round() as u64);
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
