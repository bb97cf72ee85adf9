//! Batched asynchronous delivery queue
//!
//! Items are buffered and handed to a [`BatchProcessor`] in batches, either
//! when the buffer reaches `batch_size` or when the periodic timer fires.
//! A failed batch goes back to the front of the buffer so ordering across
//! batches is preserved.

use super::error::{LoggerError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default number of failed flushes a forced drain tolerates
pub const DEFAULT_MAX_DRAIN_FAILURES: usize = 3;

/// Consumer of queued batches
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync {
    async fn process(&self, batch: &[T]) -> Result<()>;
}

/// Callback for batch failures that are not returned to a caller
pub type ErrorCallback = Arc<dyn Fn(&LoggerError) + Send + Sync>;

/// What a single flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to do, or another flush is in progress
    Idle,
    /// The processor accepted this many items
    Delivered(usize),
    /// The processor failed; this many items went back to the front
    Requeued(usize),
}

struct QueueInner<T> {
    buffer: Mutex<VecDeque<T>>,
    processing: AtomicBool,
    batch_size: usize,
    flush_interval: Duration,
    max_drain_failures: AtomicUsize,
    processor: Arc<dyn BatchProcessor<T>>,
    on_error: Mutex<Option<ErrorCallback>>,
    runtime: Mutex<Option<Handle>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    delivered: AtomicU64,
    failed_batches: AtomicU64,
}

impl<T> Drop for QueueInner<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// Clears the processing flag on every exit path and puts an undelivered
/// batch back at the front of the buffer
struct FlushGuard<'a, T> {
    inner: &'a QueueInner<T>,
    batch: Option<Vec<T>>,
}

impl<T> Drop for FlushGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            let mut buffer = self.inner.buffer.lock();
            for item in batch.into_iter().rev() {
                buffer.push_front(item);
            }
        }
        self.inner.processing.store(false, Ordering::Release);
    }
}

/// Buffered, batch-flushing queue
///
/// Cloning yields another handle to the same queue.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use rust_log_pipeline::core::{AsyncQueue, BatchProcessor, Result};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Printer;
///
/// #[async_trait]
/// impl BatchProcessor<String> for Printer {
///     async fn process(&self, batch: &[String]) -> Result<()> {
///         println!("{} lines", batch.len());
///         Ok(())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let queue = AsyncQueue::new(100, Duration::from_secs(5), Arc::new(Printer));
/// queue.add("hello".to_string());
/// queue.force_flush().await.unwrap();
/// # });
/// ```
pub struct AsyncQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for AsyncQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> AsyncQueue<T> {
    /// `batch_size` and `flush_interval` are clamped to at least 1 item / 1 ms
    pub fn new(
        batch_size: usize,
        flush_interval: Duration,
        processor: Arc<dyn BatchProcessor<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                buffer: Mutex::new(VecDeque::new()),
                processing: AtomicBool::new(false),
                batch_size: batch_size.max(1),
                flush_interval: flush_interval.max(Duration::from_millis(1)),
                max_drain_failures: AtomicUsize::new(DEFAULT_MAX_DRAIN_FAILURES),
                processor,
                on_error: Mutex::new(None),
                runtime: Mutex::new(Handle::try_current().ok()),
                timer: Mutex::new(None),
                delivered: AtomicU64::new(0),
                failed_batches: AtomicU64::new(0),
            }),
        }
    }

    /// Number of failed flushes [`AsyncQueue::force_flush`] tolerates
    #[must_use]
    pub fn with_max_drain_failures(self, max: usize) -> Self {
        self.inner
            .max_drain_failures
            .store(max.max(1), Ordering::Relaxed);
        self
    }

    /// Receive failures from timer and threshold flushes
    #[must_use]
    pub fn with_error_handler(self, callback: ErrorCallback) -> Self {
        *self.inner.on_error.lock() = Some(callback);
        self
    }

    /// Runtime used for threshold flushes and the timer when `add` or
    /// `start` are called outside of one
    #[must_use]
    pub fn with_runtime(self, handle: Handle) -> Self {
        *self.inner.runtime.lock() = Some(handle);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.inner.flush_interval
    }

    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.lock().is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    /// Whether the periodic timer is installed
    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Items accepted by the processor so far
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Batches the processor rejected so far
    pub fn failed_batch_count(&self) -> u64 {
        self.inner.failed_batches.load(Ordering::Relaxed)
    }

    /// Snapshot of the pending items, oldest first
    pub fn pending(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.buffer.lock().iter().cloned().collect()
    }

    /// Append an item; reaching `batch_size` triggers a flush right away
    pub fn add(&self, item: T) {
        let len = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push_back(item);
            buffer.len()
        };

        if len >= self.inner.batch_size {
            self.spawn_flush();
        }
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.lock().clone())
    }

    fn spawn_flush(&self) {
        // without a runtime the timer or an explicit flush picks the items up
        if let Some(handle) = self.runtime() {
            let queue = self.clone();
            handle.spawn(async move {
                queue.flush().await;
            });
        }
    }

    /// Deliver up to one batch
    ///
    /// Processor failures requeue the batch and are reported to the error
    /// handler (or stderr); they are not returned.
    pub async fn flush(&self) -> FlushOutcome {
        match self.try_flush().await {
            Ok(outcome) => outcome,
            Err((requeued, error)) => {
                self.report(&error);
                FlushOutcome::Requeued(requeued)
            }
        }
    }

    async fn try_flush(&self) -> std::result::Result<FlushOutcome, (usize, LoggerError)> {
        let inner = &*self.inner;
        if inner
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(FlushOutcome::Idle);
        }

        let mut guard = FlushGuard { inner, batch: None };
        {
            let mut buffer = inner.buffer.lock();
            if buffer.is_empty() {
                return Ok(FlushOutcome::Idle);
            }
            let take = buffer.len().min(inner.batch_size);
            guard.batch = Some(buffer.drain(..take).collect());
        }

        let batch = guard.batch.as_deref().unwrap_or_default();
        let count = batch.len();
        match inner.processor.process(batch).await {
            Ok(()) => {
                guard.batch = None;
                inner.delivered.fetch_add(count as u64, Ordering::Relaxed);
                Ok(FlushOutcome::Delivered(count))
            }
            Err(error) => {
                inner.failed_batches.fetch_add(1, Ordering::Relaxed);
                // guard drop requeues the batch at the front
                Err((count, error))
            }
        }
    }

    fn report(&self, error: &LoggerError) {
        let callback = self.inner.on_error.lock().clone();
        match callback {
            Some(callback) => callback(error),
            None => eprintln!(
                "[LOGGER ERROR] Batch delivery failed, {} items requeued: {}",
                self.len(),
                error
            ),
        }
    }

    /// Flush until the buffer is empty
    ///
    /// Gives up after `max_drain_failures` failed flushes and returns
    /// [`LoggerError::DrainIncomplete`]; the undelivered items stay queued.
    pub async fn force_flush(&self) -> Result<()> {
        let mut failures = 0;
        loop {
            if self.is_empty() {
                if !self.is_processing() {
                    return Ok(());
                }
                // a batch is in flight and may come back
                tokio::task::yield_now().await;
                continue;
            }
            match self.try_flush().await {
                Ok(FlushOutcome::Idle) => {
                    // another flush holds the batch; let it finish
                    tokio::task::yield_now().await;
                }
                Ok(_) => {}
                Err((_, error)) => {
                    failures += 1;
                    if failures >= self.inner.max_drain_failures.load(Ordering::Relaxed) {
                        self.report(&error);
                        return Err(LoggerError::DrainIncomplete {
                            remaining: self.len(),
                            attempts: failures,
                        });
                    }
                }
            }
        }
    }

    /// Install the periodic flush timer, replacing any previous one
    pub fn start(&self) -> Result<()> {
        let handle = self.runtime().ok_or_else(|| {
            LoggerError::config("AsyncQueue", "no tokio runtime available for the flush timer")
        })?;

        let weak: Weak<QueueInner<T>> = Arc::downgrade(&self.inner);
        let interval = self.inner.flush_interval;
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                AsyncQueue { inner }.flush().await;
            }
        });

        if let Some(previous) = self.inner.timer.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Cancel the periodic timer; pending items stay queued
    pub fn stop(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }
    }
}
