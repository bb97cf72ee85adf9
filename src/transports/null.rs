//! Transport that discards everything

use crate::core::{FormattedEntry, Result, Transport};
use std::sync::atomic::{AtomicU64, Ordering};

/// Accepts and drops every entry, counting writes
#[derive(Debug, Default)]
pub struct NullTransport {
    writes: AtomicU64,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Transport for NullTransport {
    fn write(&self, _record: &FormattedEntry) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
