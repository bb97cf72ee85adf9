//! Batched background delivery in front of any transport

use crate::core::{
    AsyncQueue, BatchProcessor, ErrorCallback, FormattedEntry, LoggerError, Result,
    SharedTransport, Transport,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

struct Forward {
    inner: SharedTransport,
}

#[async_trait]
impl BatchProcessor<FormattedEntry> for Forward {
    async fn process(&self, batch: &[FormattedEntry]) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let batch = batch.to_vec();
        // transports do blocking IO
        tokio::task::spawn_blocking(move || inner.write_batch(&batch))
            .await
            .map_err(|e| {
                LoggerError::transport(self.inner.name(), format!("delivery task failed: {}", e))
            })?
    }
}

/// Queues entries and hands them to the wrapped transport in batches
///
/// `write` only enqueues. Batches go out when `batch_size` entries are
/// pending and on every `flush_interval` tick; a failed batch stays at the
/// front of the queue and is retried. Entries a failed `write_batch` had
/// already accepted may be delivered twice.
///
/// # Example
///
/// ```
/// use rust_log_pipeline::prelude::*;
/// use rust_log_pipeline::transports::QueuedTransport;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let memory = Arc::new(MemoryTransport::new());
/// let queued = QueuedTransport::new(memory.clone(), 50, Duration::from_millis(200))?;
/// let logger = Logger::builder().transport(queued).build();
///
/// logger.info("batched");
/// logger.close().await?;
/// assert_eq!(memory.messages(), vec!["batched".to_string()]);
/// # Ok::<(), rust_log_pipeline::core::LoggerError>(())
/// # }).unwrap();
/// ```
pub struct QueuedTransport {
    inner: SharedTransport,
    queue: AsyncQueue<FormattedEntry>,
    name: String,
}

impl QueuedTransport {
    /// Needs to be called inside a tokio runtime; see
    /// [`QueuedTransport::with_runtime`] otherwise
    pub fn new(inner: SharedTransport, batch_size: usize, flush_interval: Duration) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| {
            LoggerError::config("QueuedTransport", "no tokio runtime; use with_runtime")
        })?;
        Self::with_runtime(inner, batch_size, flush_interval, handle)
    }

    pub fn with_runtime(
        inner: SharedTransport,
        batch_size: usize,
        flush_interval: Duration,
        handle: Handle,
    ) -> Result<Self> {
        let name = format!("queued:{}", inner.name());
        let report_name = inner.name().to_string();
        let on_error: ErrorCallback = Arc::new(move |e: &LoggerError| {
            eprintln!(
                "[LOGGER ERROR] Transport '{}' failed, batch requeued: {}",
                report_name, e
            );
        });

        let processor = Arc::new(Forward {
            inner: Arc::clone(&inner),
        });
        let queue = AsyncQueue::new(batch_size, flush_interval, processor)
            .with_runtime(handle)
            .with_error_handler(on_error);
        queue.start()?;

        Ok(Self { inner, queue, name })
    }

    pub fn queue(&self) -> &AsyncQueue<FormattedEntry> {
        &self.queue
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl std::fmt::Debug for QueuedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTransport")
            .field("name", &self.name)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[async_trait]
impl Transport for QueuedTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        self.queue.add(record.clone());
        Ok(())
    }

    fn write_batch(&self, records: &[FormattedEntry]) -> Result<()> {
        for record in records {
            self.queue.add(record.clone());
        }
        Ok(())
    }

    /// Flushes the wrapped transport; queued entries wait for the next
    /// batch or for [`Transport::close`]
    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    async fn close(&self) -> Result<()> {
        let drained = self.queue.force_flush().await;
        self.queue.stop();
        drained?;
        self.inner.close().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for QueuedTransport {
    fn drop(&mut self) {
        self.queue.stop();
        if !self.queue.is_empty() {
            eprintln!(
                "[LOGGER WARNING] {} dropped with {} undelivered entries",
                self.name,
                self.queue.len()
            );
        }
    }
}
