//! Fan-out to several transports

use crate::core::{FormattedEntry, LoggerError, Result, SharedTransport, Transport};
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Delivers each entry to every child
///
/// A failing or panicking child never stops the others; all failures are
/// reported together as [`LoggerError::Multi`].
#[derive(Default)]
pub struct MultiTransport {
    children: Vec<SharedTransport>,
}

impl MultiTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, transport: impl Transport + 'static) -> Self {
        self.children.push(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn with_shared(mut self, transport: SharedTransport) -> Self {
        self.children.push(transport);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn each<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&dyn Transport) -> Result<()>,
    {
        let mut failures = Vec::new();
        for child in &self.children {
            match catch_unwind(AssertUnwindSafe(|| op(child.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(format!("{}: {}", child.name(), e)),
                Err(_) => failures.push(format!("{}: panicked", child.name())),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LoggerError::Multi { failures })
        }
    }
}

impl std::fmt::Debug for MultiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.children.iter().map(|child| child.name()))
            .finish()
    }
}

#[async_trait]
impl Transport for MultiTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        self.each(|child| child.write(record))
    }

    fn write_batch(&self, records: &[FormattedEntry]) -> Result<()> {
        self.each(|child| child.write_batch(records))
    }

    fn flush(&self) -> Result<()> {
        self.each(|child| child.flush())
    }

    async fn close(&self) -> Result<()> {
        let mut failures = Vec::new();
        for child in &self.children {
            if let Err(e) = child.close().await {
                failures.push(format!("{}: {}", child.name(), e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LoggerError::Multi { failures })
        }
    }

    fn name(&self) -> &str {
        "multi"
    }
}
