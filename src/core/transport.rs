//! Transport trait for log delivery destinations

use super::{error::Result, formatter::Renderable, log_entry::LogEntry};
use async_trait::async_trait;
use std::sync::Arc;

/// An entry together with its formatter output
///
/// Cheap to clone: the entry is shared.
#[derive(Debug, Clone)]
pub struct FormattedEntry {
    pub entry: Arc<LogEntry>,
    pub output: Renderable,
}

impl FormattedEntry {
    pub fn new(entry: LogEntry, output: Renderable) -> Self {
        Self {
            entry: Arc::new(entry),
            output,
        }
    }
}

/// Delivery sink shared by any number of loggers
///
/// Methods take `&self`: implementations serialize their own writes so
/// that each write is atomic. `write` may hand off to background delivery
/// and return before the entry reaches its destination.
#[async_trait]
pub trait Transport: Send + Sync {
    fn write(&self, record: &FormattedEntry) -> Result<()>;

    /// Deliver several entries; the default writes them one at a time and
    /// stops at the first failure
    fn write_batch(&self, records: &[FormattedEntry]) -> Result<()> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Drain pending background deliveries; the default only flushes
    async fn close(&self) -> Result<()> {
        self.flush()
    }

    fn name(&self) -> &str;
}

/// Shared handle used by loggers and fan-outs
pub type SharedTransport = Arc<dyn Transport>;
