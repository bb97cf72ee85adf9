//! Pipeline counters
//!
//! Tracks what happened to every entry offered to a logger: delivered,
//! filtered by level, rejected by the rate limiter, or dropped on a full
//! background buffer. Transport failures are counted per failed write.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by a logger and its children
///
/// # Example
///
/// ```
/// use rust_log_pipeline::core::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_logged();
/// metrics.record_rate_limited();
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.total_logged, 1);
/// assert_eq!(snapshot.rate_limited, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    total_logged: AtomicU64,
    filtered: AtomicU64,
    rate_limited: AtomicU64,
    dropped: AtomicU64,
    transport_failures: AtomicU64,
    queue_full_events: AtomicU64,
}

/// Point-in-time copy of [`LoggerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_logged: u64,
    pub filtered: u64,
    pub rate_limited: u64,
    pub dropped: u64,
    pub transport_failures: u64,
    pub queue_full_events: u64,
}

impl MetricsSnapshot {
    /// Share of accepted entries lost to a full buffer, as a percentage
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped as f64;
        let total = self.total_logged as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            total_logged: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
        }
    }

    /// Entries handed to the transports
    #[inline]
    pub fn total_logged(&self) -> u64 {
        self.total_logged.load(Ordering::Relaxed)
    }

    /// Entries below the logger's level
    #[inline]
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_logged(&self) {
        self.total_logged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_full(&self) {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_logged: self.total_logged(),
            filtered: self.filtered(),
            rate_limited: self.rate_limited(),
            dropped: self.dropped(),
            transport_failures: self.transport_failures(),
            queue_full_events: self.queue_full_events(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_logged,
            &self.filtered,
            &self.rate_limited,
            &self.dropped,
            &self.transport_failures,
            &self.queue_full_events,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
