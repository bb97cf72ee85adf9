//! Batched JSON delivery to an HTTP collector
//!
//! Entries are queued and POSTed as JSON arrays. Network errors, `429` and
//! `5xx` responses are retried with jittered exponential backoff; once the
//! retries are spent the batch goes back to the queue. Other client errors
//! mean the collector will never take the batch, so it is dropped and
//! counted.

use crate::core::{
    AsyncQueue, BatchProcessor, ErrorCallback, FormattedEntry, LoggerError, Renderable, Result,
    Transport,
};
use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Whether a response status is worth another attempt
pub fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Delay before retry `attempt` (0-based): `base * 2^attempt` plus up to
/// `base` of jitter, capped at 30s
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms));
    exponential.saturating_add(jitter).min(MAX_BACKOFF)
}

struct Sender {
    client: reqwest::Client,
    endpoint: String,
    headers: Vec<(String, String)>,
    max_retries: u32,
    retry_base: Duration,
    rejected: Arc<AtomicU64>,
}

impl Sender {
    async fn post(&self, batch: &[Value]) -> std::result::Result<StatusCode, reqwest::Error> {
        let mut request = self.client.post(&self.endpoint).json(batch);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request.send().await?.status())
    }
}

#[async_trait]
impl BatchProcessor<Value> for Sender {
    async fn process(&self, batch: &[Value]) -> Result<()> {
        let mut attempt = 0;
        loop {
            let failure = match self.post(batch).await {
                Ok(status) if status.is_success() => return Ok(()),
                Ok(status) if !is_retryable(status) => {
                    self.rejected
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    eprintln!(
                        "[LOGGER ERROR] Transport 'http' failed: {} rejected {} entries with {}; dropping them",
                        self.endpoint,
                        batch.len(),
                        status
                    );
                    return Ok(());
                }
                Ok(status) => LoggerError::transport("http", format!("collector answered {}", status)),
                Err(e) => LoggerError::Http(e),
            };

            if attempt >= self.max_retries {
                return Err(failure);
            }
            tokio::time::sleep(backoff_delay(self.retry_base, attempt)).await;
            attempt += 1;
        }
    }
}

/// Configures an [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    endpoint: String,
    batch_size: usize,
    flush_interval: Duration,
    max_retries: u32,
    retry_base: Duration,
    timeout: Duration,
    headers: Vec<(String, String)>,
    runtime: Option<Handle>,
}

impl HttpTransportBuilder {
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Extra attempts per flush after the first one fails
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Runtime for the flush timer when built outside of one
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        if self.endpoint.trim().is_empty() {
            return Err(LoggerError::config("HttpTransport", "missing endpoint"));
        }
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                LoggerError::config("HttpTransport", "no tokio runtime for the flush timer")
            })?,
        };

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let rejected = Arc::new(AtomicU64::new(0));
        let sender = Arc::new(Sender {
            client,
            endpoint: self.endpoint.clone(),
            headers: self.headers,
            max_retries: self.max_retries,
            retry_base: self.retry_base,
            rejected: Arc::clone(&rejected),
        });

        let on_error: ErrorCallback = Arc::new(|e: &LoggerError| {
            eprintln!("[LOGGER ERROR] Transport 'http' failed, batch requeued: {}", e);
        });
        let queue = AsyncQueue::new(self.batch_size, self.flush_interval, sender)
            .with_runtime(handle)
            .with_error_handler(on_error);
        queue.start()?;

        Ok(HttpTransport {
            endpoint: self.endpoint,
            queue,
            rejected,
        })
    }
}

/// Ships entries to a collector as batched JSON arrays
///
/// Structured formatter output is sent as is; text output is replaced by
/// the serialized entry so the collector always receives objects.
///
/// # Example
///
/// ```no_run
/// use rust_log_pipeline::prelude::*;
/// use rust_log_pipeline::transports::HttpTransport;
/// use std::time::Duration;
///
/// # async fn run() -> rust_log_pipeline::core::Result<()> {
/// let http = HttpTransport::builder("https://logs.example.com/ingest")
///     .batch_size(500)
///     .flush_interval(Duration::from_secs(2))
///     .header("Authorization", "Bearer abc")
///     .build()?;
///
/// let logger = Logger::builder().transport(http).build();
/// logger.info("shipped");
/// logger.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    endpoint: String,
    queue: AsyncQueue<Value>,
    rejected: Arc<AtomicU64>,
}

impl HttpTransport {
    pub fn builder(endpoint: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            endpoint: endpoint.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
            runtime: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn queue(&self) -> &AsyncQueue<Value> {
        &self.queue
    }

    /// Entries dropped because the collector refused them outright
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn payload(record: &FormattedEntry) -> Result<Value> {
        match record.output {
            Renderable::Structured(ref value) => Ok(value.clone()),
            Renderable::Text(_) => Ok(serde_json::to_value(&*record.entry)?),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn write(&self, record: &FormattedEntry) -> Result<()> {
        self.queue.add(Self::payload(record)?);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let drained = self.queue.force_flush().await;
        self.queue.stop();
        drained
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.queue.stop();
    }
}
