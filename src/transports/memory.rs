//! In-memory transport, mostly for tests and diagnostics

use crate::core::{FormattedEntry, LogLevel, Renderable, Result, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Keeps delivered entries in arrival order
///
/// With a capacity the oldest entry is evicted once the buffer is full.
///
/// # Example
///
/// ```
/// use rust_log_pipeline::prelude::*;
/// use std::sync::Arc;
///
/// let memory = Arc::new(MemoryTransport::new());
/// let logger = Logger::builder()
///     .level(LogLevel::Info)
///     .shared_transport(memory.clone())
///     .build();
///
/// logger.info("hello");
/// logger.debug("hidden");
/// assert_eq!(memory.messages(), vec!["hello".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryTransport {
    records: Mutex<VecDeque<FormattedEntry>>,
    capacity: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded buffer; a capacity of zero keeps nothing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn entries(&self) -> Vec<FormattedEntry> {
        self.records.lock().iter().cloned().collect()
    }

    /// Raw messages of the stored entries
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.entry.message.clone())
            .collect()
    }

    /// Formatter output of the stored entries
    pub fn outputs(&self) -> Vec<Renderable> {
        self.records
            .lock()
            .iter()
            .map(|record| record.output.clone())
            .collect()
    }

    pub fn levels(&self) -> Vec<LogLevel> {
        self.records
            .lock()
            .iter()
            .map(|record| record.entry.level)
            .collect()
    }

    pub fn last(&self) -> Option<FormattedEntry> {
        self.records.lock().back().cloned()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        let mut records = self.records.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Ok(());
            }
            while records.len() >= capacity {
                records.pop_front();
            }
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
