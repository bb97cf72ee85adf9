//! Main logger implementation

use super::{
    config::{DispatchMode, LocationCapture, LoggerConfig, LoggerSettings},
    environment::{Clock, Environment, Runtime},
    error::{LoggerError, Result},
    formatter::{Formatter, Renderable},
    log_context::{ContextGuard, ContextStack, LogContext},
    log_entry::LogEntry,
    log_level::LogLevel,
    metrics::LoggerMetrics,
    rate_limiter::{RateLimitConfig, RateLimitScope, RateLimiter},
    timestamp::TimestampFormat,
    transport::{FormattedEntry, SharedTransport, Transport},
};
use crate::formatters::OutputFormat;
use crate::utils::{format_duration, sanitize, CallSite, Loggable, PerformanceEntry, StackInspector, Timer};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
///
/// Used when the last handle to a logger is dropped without an explicit
/// [`Logger::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const DROP_ALERT_INTERVAL: u64 = 1000;

/// Transports plus the failure policy around them
///
/// Owned jointly by the loggers and the background worker so the worker
/// never keeps the logger state alive.
struct Delivery {
    transports: Vec<SharedTransport>,
    fallback: Option<SharedTransport>,
    metrics: Arc<LoggerMetrics>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl Delivery {
    /// Write to every transport; a failing or panicking transport never
    /// keeps the others from receiving the entry
    fn deliver(&self, record: &FormattedEntry) {
        for transport in &self.transports {
            match catch_unwind(AssertUnwindSafe(|| transport.write(record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.report_failure(transport.name(), &e.to_string(), Some(record)),
                Err(panic) => {
                    let message = format!("panicked: {}", panic_message(panic.as_ref()));
                    self.report_failure(transport.name(), &message, Some(record));
                }
            }
        }
        self.metrics.record_logged();
    }

    /// Flush every transport, collecting failures
    fn flush_all(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for transport in &self.transports {
            let message = match catch_unwind(AssertUnwindSafe(|| transport.flush())) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked during flush: {}", panic_message(panic.as_ref())),
            };
            self.report_failure(transport.name(), &message, None);
            failures.push(format!("{}: {}", transport.name(), message));
        }
        failures
    }

    fn report_failure(&self, name: &str, message: &str, record: Option<&FormattedEntry>) {
        self.metrics.record_transport_failure();

        let Some(ref fallback) = self.fallback else {
            eprintln!("[LOGGER ERROR] Transport '{}' failed: {}", name, message);
            return;
        };

        let text = format!("Transport '{}' failed: {}", name, message);
        let mut report = LogEntry::new(LogLevel::Error, &text).with_logger_name("logger");
        if let Some(record) = record {
            report = report.with_data(json!({
                "transport": name,
                "level": record.entry.level.as_key(),
                "message": record.entry.message,
            }));
        }
        let report = FormattedEntry::new(report, Renderable::Text(format!("[LOGGER ERROR] {}", text)));

        match catch_unwind(AssertUnwindSafe(|| fallback.write(&report))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!(
                "[LOGGER ERROR] Fallback transport '{}' failed: {} (original failure: {})",
                fallback.name(),
                e,
                text
            ),
            Err(_) => eprintln!(
                "[LOGGER CRITICAL] Fallback transport '{}' panicked (original failure: {})",
                fallback.name(),
                text
            ),
        }
    }
}

enum Command {
    Entry(FormattedEntry),
    /// Acknowledged once every earlier entry has been delivered
    Barrier(Sender<()>),
}

struct Dispatcher {
    sender: Sender<Command>,
    handle: thread::JoinHandle<()>,
}

impl Dispatcher {
    fn spawn(buffer: usize, delivery: Arc<Delivery>) -> Result<Self> {
        let (sender, receiver) = bounded::<Command>(buffer.max(1));
        let handle = thread::Builder::new()
            .name("log-dispatch".to_string())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    let mut pending = Some(command);
                    // deliver whatever is already buffered, then flush once
                    while let Some(command) = pending.take() {
                        match command {
                            Command::Entry(record) => delivery.deliver(&record),
                            Command::Barrier(ack) => {
                                let _ = ack.send(());
                            }
                        }
                        pending = receiver.try_recv().ok();
                    }
                    delivery.flush_all();
                }
            })
            .map_err(|e| {
                LoggerError::io_operation("spawning the dispatch thread", "log-dispatch", e)
            })?;

        Ok(Self { sender, handle })
    }

    /// Close the channel and wait for the worker to drain it
    fn stop(self, timeout: Duration) -> bool {
        drop(self.sender);
        let start = Instant::now();

        loop {
            if self.handle.is_finished() {
                if let Err(e) = self.handle.join() {
                    eprintln!(
                        "[LOGGER ERROR] Dispatch thread panicked during shutdown: {:?}",
                        e
                    );
                    return false;
                }
                return true;
            }

            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] Dispatch thread did not finish within {:?} timeout. \
                     Some logs may be lost.",
                    timeout
                );
                return false;
            }

            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// State shared by a logger and all of its children
struct Shared {
    level: RwLock<LogLevel>,
    formatter: Arc<dyn Formatter>,
    delivery: Arc<Delivery>,
    rate_limiter: Option<(RateLimiter, RateLimitScope)>,
    capture: LocationCapture,
    inspector: StackInspector,
    max_depth: usize,
    environment: Environment,
    runtime: Runtime,
    clock: Arc<dyn Clock>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl Shared {
    fn stop_dispatcher(&self, timeout: Duration) -> bool {
        match self.dispatcher.lock().take() {
            Some(dispatcher) => dispatcher.stop(timeout),
            None => true,
        }
    }

    /// Wait until the background worker has delivered everything sent so far
    fn barrier(&self, timeout: Duration) -> Result<()> {
        let sender = match self.dispatcher.lock().as_ref() {
            Some(dispatcher) => dispatcher.sender.clone(),
            None => return Ok(()),
        };
        let (ack_tx, ack_rx) = bounded(1);
        sender
            .send(Command::Barrier(ack_tx))
            .map_err(|_| LoggerError::QueueClosed)?;
        ack_rx.recv_timeout(timeout).map_err(|_| {
            LoggerError::other(format!(
                "background dispatch did not drain within {:?}",
                timeout
            ))
        })
    }

    fn dispatch(&self, record: FormattedEntry) {
        let sender = self
            .dispatcher
            .lock()
            .as_ref()
            .map(|dispatcher| dispatcher.sender.clone());

        let Some(sender) = sender else {
            self.delivery.deliver(&record);
            return;
        };

        match sender.try_send(Command::Entry(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(Command::Entry(record))) => self.handle_overflow(&sender, record),
            Err(TrySendError::Full(Command::Barrier(_))) => {}
            Err(TrySendError::Disconnected(Command::Entry(record))) => {
                // dispatcher gone, deliver inline
                self.delivery.deliver(&record);
            }
            Err(TrySendError::Disconnected(Command::Barrier(_))) => {}
        }
    }

    /// Full buffer: errors wait for space, everything else is dropped
    fn handle_overflow(&self, sender: &Sender<Command>, record: FormattedEntry) {
        let metrics = &self.delivery.metrics;
        metrics.record_queue_full();

        if record.entry.level == LogLevel::Error {
            if let Err(err) = sender.send(Command::Entry(record)) {
                if let Command::Entry(record) = err.0 {
                    self.delivery.deliver(&record);
                }
            }
            return;
        }

        metrics.record_dropped();
        let dropped = metrics.dropped();
        if dropped == 1 || dropped % DROP_ALERT_INTERVAL == 0 {
            eprintln!(
                "[LOGGER WARNING] Dispatch buffer full, {} logs dropped. \
                 Consider increasing the background buffer size.",
                dropped
            );
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop_dispatcher(DEFAULT_SHUTDOWN_TIMEOUT);
        self.delivery.flush_all();

        let snapshot = self.delivery.metrics.snapshot();
        if snapshot.dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                snapshot.dropped,
                snapshot.drop_rate()
            );
        }
    }
}

/// Level-filtered, context-aware logger
///
/// Cheap to derive children from: [`Logger::child`] shares transports,
/// formatter, level, rate limiter and metrics, and copies the context.
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
/// logger.debug("x");
/// logger.info("y");
/// assert_eq!(memory.messages(), vec!["y".to_string()]);
/// ```
pub struct Logger {
    shared: Arc<Shared>,
    context: RwLock<LogContext>,
    stack: Arc<ContextStack>,
    name: Option<String>,
}

impl Logger {
    /// Build a logger from a complete configuration
    ///
    /// Fails only when the background dispatch thread cannot be spawned.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        match Self::assemble(config) {
            (logger, None) => Ok(logger),
            (_, Some(e)) => Err(e),
        }
    }

    /// Always yields a logger; a dispatcher that failed to start leaves it
    /// in synchronous mode and the error is returned alongside
    fn assemble(config: LoggerConfig) -> (Self, Option<LoggerError>) {
        let level = config.effective_level();
        let delivery = Arc::new(Delivery {
            transports: config.transports,
            fallback: config.fallback,
            metrics: Arc::new(LoggerMetrics::new()),
        });

        let (dispatcher, spawn_error) = match config.dispatch {
            DispatchMode::Sync => (None, None),
            DispatchMode::Background { buffer } => {
                match Dispatcher::spawn(buffer, Arc::clone(&delivery)) {
                    Ok(dispatcher) => (Some(dispatcher), None),
                    Err(e) => (None, Some(e)),
                }
            }
        };

        let rate_limiter = config.rate_limit.map(|limit| {
            (
                RateLimiter::with_clock(limit.max, limit.window, Arc::clone(&config.clock)),
                limit.scope,
            )
        });

        let inspector = match config.capture_location {
            LocationCapture::Backtrace { skip } => StackInspector::new(skip),
            _ => StackInspector::default(),
        };

        let logger = Self {
            shared: Arc::new(Shared {
                level: RwLock::new(level),
                formatter: config.formatter,
                delivery,
                rate_limiter,
                capture: config.capture_location,
                inspector,
                max_depth: config.max_depth,
                environment: config.environment,
                runtime: config.runtime,
                clock: config.clock,
                dispatcher: Mutex::new(dispatcher),
            }),
            context: RwLock::new(config.context),
            stack: Arc::new(ContextStack::new()),
            name: config.name,
        };
        (logger, spawn_error)
    }

    /// Console logger configured from `APP_ENV` and `LOG_LEVEL`
    pub fn from_env() -> Result<Self> {
        Self::new(LoggerConfig::from_env()?)
    }

    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    pub fn level(&self) -> LogLevel {
        *self.shared.level.read()
    }

    /// Change the level for this logger and every logger sharing its state
    pub fn set_level(&self, level: LogLevel) {
        *self.shared.level.write() = level;
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        LogLevel::should_log(self.level(), level)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.shared.environment
    }

    pub fn runtime(&self) -> Runtime {
        self.shared.runtime
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.shared.delivery.metrics
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.shared
            .delivery
            .transports
            .iter()
            .map(|transport| transport.name().to_string())
            .collect()
    }

    // ---- context ----

    /// This logger's own context, without pushed layers
    pub fn context(&self) -> LogContext {
        self.context.read().clone()
    }

    /// Replace this logger's own context
    pub fn set_context(&self, context: LogContext) {
        *self.context.write() = context;
    }

    pub fn add_field<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.context.write().add_field(key, value);
    }

    /// Push a scoped context layer; it is removed when the guard drops
    pub fn push_context(&self, context: LogContext) -> ContextGuard {
        ContextGuard::push(&self.stack, context)
    }

    /// Own context merged with every active layer
    pub fn effective_context(&self) -> LogContext {
        let mut context = self.context();
        self.stack.apply_to(&mut context);
        context
    }

    /// Derived logger with `context` merged over this logger's effective
    /// context; later changes on either side stay local
    pub fn child(&self, context: LogContext) -> Logger {
        Logger {
            shared: Arc::clone(&self.shared),
            context: RwLock::new(self.effective_context().merge(&context)),
            stack: Arc::new(ContextStack::new()),
            name: self.name.clone(),
        }
    }

    /// Child logger with its own name
    pub fn named(&self, name: impl Into<String>) -> Logger {
        let mut child = self.child(LogContext::new());
        child.name = Some(name.into());
        child
    }

    // ---- logging ----

    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>, data: Option<Loggable>) {
        self.emit(level, message.as_ref(), data, None, Location::caller());
    }

    /// Log with an extra context for this call only
    #[track_caller]
    pub fn log_with(
        &self,
        level: LogLevel,
        message: impl AsRef<str>,
        data: Option<Loggable>,
        context: &LogContext,
    ) {
        self.emit(level, message.as_ref(), data, Some(context), Location::caller());
    }

    fn emit(
        &self,
        level: LogLevel,
        message: &str,
        data: Option<Loggable>,
        call_context: Option<&LogContext>,
        location: &'static Location<'static>,
    ) {
        let shared = &*self.shared;
        if !self.is_enabled(level) {
            shared.delivery.metrics.record_filtered();
            return;
        }

        let mut context = self.effective_context();
        if let Some(extra) = call_context {
            context.merge_from(extra);
        }

        let mut entry = LogEntry::at(shared.clock.now(), level, message).with_context(context);
        if let Some(ref data) = data {
            entry = entry.with_data(sanitize(data, shared.max_depth));
        }
        if let Some(site) = self.call_site(location) {
            entry = entry.with_call_site(site);
        }
        if let Some(ref name) = self.name {
            entry = entry.with_logger_name(name.clone());
        }

        if let Some((ref limiter, scope)) = shared.rate_limiter {
            if !limiter.is_allowed(scope.key_for(level)) {
                shared.delivery.metrics.record_rate_limited();
                return;
            }
        }

        let output = match catch_unwind(AssertUnwindSafe(|| shared.formatter.format(&entry))) {
            Ok(output) => output,
            Err(panic) => {
                eprintln!(
                    "[LOGGER CRITICAL] Formatter '{}' panicked: {}. Falling back to the raw message.",
                    shared.formatter.name(),
                    panic_message(panic.as_ref())
                );
                Renderable::Text(entry.message.clone())
            }
        };

        shared.dispatch(FormattedEntry::new(entry, output));
    }

    fn call_site(&self, location: &'static Location<'static>) -> Option<CallSite> {
        match self.shared.capture {
            LocationCapture::Off => None,
            LocationCapture::Caller => Some(CallSite::from_location(location)),
            LocationCapture::Backtrace { .. } => self
                .shared
                .inspector
                .capture()
                .or_else(|| Some(CallSite::from_location(location))),
        }
    }

    #[inline]
    #[track_caller]
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn http(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Http, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn verbose(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Verbose, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn silly(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Silly, message, None);
    }

    #[inline]
    #[track_caller]
    pub fn error_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Error, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn warn_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Warn, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn info_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Info, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn http_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Http, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn verbose_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Verbose, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn debug_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Debug, message, Some(data.into()));
    }

    #[inline]
    #[track_caller]
    pub fn silly_with(&self, message: impl AsRef<str>, data: impl Into<Loggable>) {
        self.log(LogLevel::Silly, message, Some(data.into()));
    }

    // ---- timing ----

    pub fn start_timer(&self, label: impl Into<String>) -> Timer {
        Timer::start(label)
    }

    /// Log `"<label> completed in <duration>"` with the context's timing set
    #[track_caller]
    pub fn log_timing(&self, level: LogLevel, perf: &PerformanceEntry) {
        let message = format!("{} completed in {}", perf.label, format_duration(perf.duration_ms()));
        let context = LogContext::new().with_timing(perf.to_timing());
        self.log_with(level, message, None, &context);
    }

    /// Run `f` and log its duration at debug level
    #[track_caller]
    pub fn measure<T>(&self, label: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let timer = self.start_timer(label);
        let result = f();
        self.log_timing(LogLevel::Debug, &timer.end());
        result
    }

    // ---- lifecycle ----

    /// Deliver pending background entries and flush every transport
    pub fn flush(&self) -> Result<()> {
        let mut failures = Vec::new();
        if let Err(e) = self.shared.barrier(DEFAULT_SHUTDOWN_TIMEOUT) {
            failures.push(format!("dispatch: {}", e));
        }
        failures.extend(self.shared.delivery.flush_all());
        into_result(failures)
    }

    /// Drain background work, then close every transport
    ///
    /// Closing waits for queued transports to drain (bounded by each
    /// transport's own retry policy).
    pub async fn close(&self) -> Result<()> {
        let mut failures = Vec::new();
        if let Err(e) = self.shared.barrier(DEFAULT_SHUTDOWN_TIMEOUT) {
            failures.push(format!("dispatch: {}", e));
        }
        for transport in &self.shared.delivery.transports {
            if let Err(e) = transport.close().await {
                self.shared.delivery.report_failure(transport.name(), &e.to_string(), None);
                failures.push(format!("{}: {}", transport.name(), e));
            }
        }
        into_result(failures)
    }

    /// Stop the background dispatcher and flush
    ///
    /// Returns `true` if everything drained within `timeout`. Later entries
    /// are delivered on the calling thread.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_log_pipeline::prelude::*;
    /// use std::time::Duration;
    ///
    /// let logger = Logger::builder().background(1000).build();
    /// logger.info("Important message");
    ///
    /// if !logger.shutdown(Duration::from_secs(10)) {
    ///     eprintln!("Warning: Logger shutdown timed out");
    /// }
    /// ```
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let drained = self.shared.stop_dispatcher(timeout);
        let failures = self.shared.delivery.flush_all();
        if !failures.is_empty() {
            eprintln!(
                "[LOGGER ERROR] Failed to flush during shutdown: {}",
                failures.join("; ")
            );
            return false;
        }
        drained
    }
}

fn into_result(failures: Vec<String>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(LoggerError::Multi { failures })
    }
}

impl Default for Logger {
    fn default() -> Self {
        LoggerBuilder::new().build()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("transports", &self.transport_names())
            .field("context", &*self.context.read())
            .finish()
    }
}

/// Builder for constructing Logger with a fluent API
///
/// # Example
/// ```
/// use rust_log_pipeline::prelude::*;
/// use std::time::Duration;
///
/// let logger = Logger::builder()
///     .level(LogLevel::Debug)
///     .name("api")
///     .transport(NullTransport::new())
///     .rate_limit(RateLimitConfig::new(100, Duration::from_secs(1)))
///     .capture_location(LocationCapture::Caller)
///     .background(1000)
///     .build();
/// ```
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::new(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: LoggerConfig) -> Self {
        Self { config }
    }

    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = Some(level);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.config.transports.push(Arc::new(transport));
        self
    }

    /// Add a transport that is also used elsewhere
    #[must_use = "builder methods return a new value"]
    pub fn shared_transport(mut self, transport: SharedTransport) -> Self {
        self.config.transports.push(transport);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn formatter<F: Formatter + 'static>(mut self, formatter: F) -> Self {
        self.config.formatter = Arc::new(formatter);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn shared_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.config.formatter = formatter;
        self
    }

    /// Use a built-in formatter
    #[must_use = "builder methods return a new value"]
    pub fn output_format(mut self, format: OutputFormat, colors: bool) -> Self {
        self.config.formatter = format.formatter(colors, TimestampFormat::default());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn context(mut self, context: LogContext) -> Self {
        self.config.context = context;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn capture_location(mut self, capture: LocationCapture) -> Self {
        self.config.capture_location = capture;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(limit);
        self
    }

    /// Nesting depth kept when sanitizing payloads
    #[must_use = "builder methods return a new value"]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Deployment mode; picks the level when none is set explicitly
    #[must_use = "builder methods return a new value"]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.config.runtime = runtime;
        self
    }

    /// Transport that receives reports about failing transports
    #[must_use = "builder methods return a new value"]
    pub fn fallback<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.config.fallback = Some(Arc::new(transport));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn shared_fallback(mut self, transport: SharedTransport) -> Self {
        self.config.fallback = Some(transport);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    /// Deliver on a worker thread with a buffer of `buffer` entries
    #[must_use = "builder methods return a new value"]
    pub fn background(self, buffer: usize) -> Self {
        self.dispatch(DispatchMode::Background { buffer })
    }

    #[must_use = "builder methods return a new value"]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    /// Apply declarative settings; fails on an invalid level or limit
    pub fn settings(mut self, settings: &LoggerSettings) -> Result<Self> {
        settings.validate()?;

        if let Some(level) = settings.parsed_level()? {
            self.config.level = Some(level);
        }
        if settings.format.is_some() || settings.colors.is_some() || settings.timestamp.is_some() {
            let format = settings.format.unwrap_or_default();
            let colors = settings.colors.unwrap_or(false);
            let timestamp = settings.timestamp.clone().unwrap_or_default();
            self.config.formatter = format.formatter(colors, timestamp);
        }
        if let Some(ref name) = settings.name {
            self.config.name = Some(name.clone());
        }
        if let Some(capture) = settings.capture_location {
            self.config.capture_location = capture;
        }
        if let Some(depth) = settings.max_depth {
            self.config.max_depth = depth;
        }
        if let Some(ref limit) = settings.rate_limit {
            self.config.rate_limit = Some(RateLimitConfig::from(limit));
        }
        if let Some(buffer) = settings.background_buffer {
            self.config.dispatch = DispatchMode::Background { buffer };
        }
        Ok(self)
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn try_build(self) -> Result<Logger> {
        Logger::new(self.config)
    }

    /// Build the Logger
    ///
    /// If the background thread cannot be spawned the logger falls back
    /// to synchronous dispatch.
    pub fn build(self) -> Logger {
        let (logger, spawn_error) = Logger::assemble(self.config);
        if let Some(e) = spawn_error {
            eprintln!("[LOGGER WARNING] {}; using synchronous dispatch instead", e);
        }
        logger
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::ManualClock;
    use crate::transports::MemoryTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingTransport {
        panic: bool,
        attempts: AtomicUsize,
    }

    impl FailingTransport {
        fn erroring() -> Self {
            Self {
                panic: false,
                attempts: AtomicUsize::new(0),
            }
        }

        fn panicking() -> Self {
            Self {
                panic: true,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for FailingTransport {
        fn write(&self, _record: &FormattedEntry) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("transport exploded");
            }
            Err(LoggerError::transport("failing", "disk full"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn memory_logger(level: LogLevel) -> (Logger, Arc<MemoryTransport>) {
        let memory = Arc::new(MemoryTransport::new());
        let logger = Logger::builder()
            .level(level)
            .shared_transport(memory.clone())
            .build();
        (logger, memory)
    }

    #[test]
    fn test_level_filtering_end_to_end() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        logger.debug("x");
        logger.info("y");

        let entries = memory.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.message, "y");
        assert_eq!(logger.metrics().filtered(), 1);
        assert_eq!(logger.metrics().total_logged(), 1);
    }

    #[test]
    fn test_silent_emits_nothing() {
        let (logger, memory) = memory_logger(LogLevel::Silent);
        logger.error("boom");
        logger.log(LogLevel::Silent, "never", None);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_set_level_is_shared_with_children() {
        let (logger, memory) = memory_logger(LogLevel::Error);
        let child = logger.child(LogContext::new());
        child.set_level(LogLevel::Debug);
        logger.debug("now visible");
        assert_eq!(memory.len(), 1);
        assert_eq!(logger.level(), LogLevel::Debug);
    }

    #[test]
    fn test_default_level_follows_environment() {
        let logger = Logger::builder().environment(Environment::Production).build();
        assert_eq!(logger.level(), LogLevel::Info);
        let logger = Logger::builder().environment(Environment::Test).build();
        assert_eq!(logger.level(), LogLevel::Debug);
        let logger = Logger::builder()
            .environment(Environment::Test)
            .level(LogLevel::Silly)
            .build();
        assert_eq!(logger.level(), LogLevel::Silly);
    }

    #[test]
    fn test_child_context_is_independent() {
        let (parent, memory) = memory_logger(LogLevel::Info);
        parent.add_field("service", "api");

        let child = parent.child(LogContext::new().with_field("component", "db"));
        child.add_field("pool", 4);
        parent.add_field("region", "eu");

        assert!(parent.context().get("pool").is_none());
        assert!(parent.context().get("component").is_none());
        assert!(child.context().get("region").is_none());
        assert_eq!(child.context().get("service"), Some(&json!("api")));

        child.info("from child");
        let entry = &memory.entries()[0].entry;
        assert_eq!(entry.context.get("component"), Some(&json!("db")));
        assert_eq!(entry.context.get("pool"), Some(&json!(4)));
    }

    #[test]
    fn test_pushed_context_is_scoped() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        {
            let _guard = logger.push_context(LogContext::new().with_request_id("req-7"));
            logger.info("inside");
        }
        logger.info("outside");

        let entries = memory.entries();
        assert_eq!(entries[0].entry.request_id.as_deref(), Some("req-7"));
        assert_eq!(entries[1].entry.request_id, None);
    }

    #[test]
    fn test_call_context_merges_over_logger_context() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        logger.set_context(
            LogContext::new()
                .with_metadata("a", 1)
                .with_timing(json!({"label": "old"})),
        );
        let call = LogContext::new()
            .with_metadata("b", 2)
            .with_timing(json!({"label": "new"}));
        logger.log_with(LogLevel::Info, "merged", None, &call);

        let context = &memory.entries()[0].entry.context;
        assert_eq!(context.metadata().get("a"), Some(&json!(1)));
        assert_eq!(context.metadata().get("b"), Some(&json!(2)));
        assert_eq!(context.timing(), Some(&json!({"label": "new"})));
    }

    #[test]
    fn test_data_is_sanitized() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        logger.info_with(
            "login",
            Loggable::map([("user", Loggable::from("ann")), ("password", Loggable::from("hunter2"))]),
        );
        let data = memory.entries()[0].entry.data.clone().unwrap();
        assert_eq!(data["user"], "ann");
        assert_eq!(data["password"], "[REDACTED]");
    }

    #[test]
    fn test_failing_transport_does_not_block_others() {
        let memory = Arc::new(MemoryTransport::new());
        let erroring = Arc::new(FailingTransport::erroring());
        let panicking = Arc::new(FailingTransport::panicking());
        let fallback = Arc::new(MemoryTransport::new());

        let logger = Logger::builder()
            .level(LogLevel::Info)
            .shared_transport(erroring.clone())
            .shared_transport(panicking.clone())
            .shared_transport(memory.clone())
            .shared_fallback(fallback.clone())
            .build();

        logger.info("still delivered");

        assert_eq!(memory.messages(), vec!["still delivered".to_string()]);
        assert_eq!(erroring.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(panicking.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(logger.metrics().transport_failures(), 2);

        let reports = fallback.entries();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].entry.message.contains("disk full"));
        assert!(reports[1].entry.message.contains("transport exploded"));
        assert_eq!(
            reports[0].entry.data.as_ref().unwrap()["message"],
            "still delivered"
        );
    }

    #[test]
    fn test_rate_limited_entries_are_counted() {
        let memory = Arc::new(MemoryTransport::new());
        let clock = Arc::new(ManualClock::new());
        let logger = Logger::builder()
            .level(LogLevel::Debug)
            .shared_transport(memory.clone())
            .clock(clock.clone())
            .rate_limit(RateLimitConfig::new(2, Duration::from_secs(1)))
            .build();

        for i in 0..5 {
            logger.info(format!("msg {}", i));
        }
        assert_eq!(memory.len(), 2);
        assert_eq!(logger.metrics().rate_limited(), 3);

        clock.advance(Duration::from_secs(1));
        logger.info("next window");
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn test_per_level_rate_limit() {
        let memory = Arc::new(MemoryTransport::new());
        let logger = Logger::builder()
            .level(LogLevel::Debug)
            .shared_transport(memory.clone())
            .clock(Arc::new(ManualClock::new()))
            .rate_limit(RateLimitConfig::new(1, Duration::from_secs(1)).per_level())
            .build();

        logger.info("a");
        logger.info("b");
        logger.error("c");
        assert_eq!(memory.messages(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_caller_location_captured() {
        let memory = Arc::new(MemoryTransport::new());
        let logger = Logger::builder()
            .level(LogLevel::Info)
            .shared_transport(memory.clone())
            .capture_location(LocationCapture::Caller)
            .build();

        logger.info("here");
        let site = memory.entries()[0].entry.call_site.clone().unwrap();
        assert_eq!(site.file.as_deref(), Some(file!()));
    }

    #[test]
    fn test_log_timing_message_and_context() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        let perf = PerformanceEntry {
            label: "db_query".to_string(),
            duration: Duration::from_micros(1500),
            memory_delta: None,
        };
        logger.log_timing(LogLevel::Info, &perf);

        let entry = &memory.entries()[0].entry;
        assert_eq!(entry.message, "db_query completed in 1.5ms");
        assert_eq!(entry.context.timing().unwrap()["label"], "db_query");
    }

    #[test]
    fn test_named_child() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        logger.named("billing").info("charged");
        assert_eq!(memory.entries()[0].entry.logger.as_deref(), Some("billing"));
        assert_eq!(logger.name(), None);
    }

    #[test]
    fn test_background_dispatch_preserves_order() {
        let memory = Arc::new(MemoryTransport::new());
        let logger = Logger::builder()
            .level(LogLevel::Info)
            .shared_transport(memory.clone())
            .background(64)
            .build();

        for i in 0..50 {
            logger.info(format!("{}", i));
        }
        logger.flush().unwrap();

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(memory.messages(), expected);
        assert!(logger.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn test_after_shutdown_delivery_is_inline() {
        let memory = Arc::new(MemoryTransport::new());
        let logger = Logger::builder()
            .level(LogLevel::Info)
            .shared_transport(memory.clone())
            .background(8)
            .build();
        assert!(logger.shutdown(Duration::from_secs(1)));
        logger.info("late");
        assert_eq!(memory.messages(), vec!["late".to_string()]);
    }

    #[test]
    fn test_flush_reports_failures() {
        struct BadFlush;
        impl Transport for BadFlush {
            fn write(&self, _record: &FormattedEntry) -> Result<()> {
                Ok(())
            }
            fn flush(&self) -> Result<()> {
                Err(LoggerError::other("no flush"))
            }
            fn name(&self) -> &str {
                "bad_flush"
            }
        }

        let logger = Logger::builder()
            .transport(BadFlush)
            .shared_fallback(Arc::new(MemoryTransport::new()))
            .build();
        let err = logger.flush().unwrap_err();
        assert!(matches!(err, LoggerError::Multi { ref failures } if failures.len() == 1));
    }

    #[tokio::test]
    async fn test_close_closes_transports() {
        let (logger, memory) = memory_logger(LogLevel::Info);
        logger.info("bye");
        logger.close().await.unwrap();
        assert_eq!(memory.len(), 1);
    }
}
