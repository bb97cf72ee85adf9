//! Integration tests for the logging pipeline
//!
//! These tests verify:
//! - Level filtering end to end
//! - Context inheritance through child loggers
//! - Payload sanitizing on the way to transports
//! - Formatter output reaching file and stream transports
//! - Failure isolation between transports
//! - Batched delivery through queued transports
//! - Configuration from settings and environment values

use rust_log_pipeline::core::{
    LocationCapture, LogContext, LogLevel, Logger, LoggerConfig, LoggerError, LoggerSettings,
    ManualClock, RateLimitConfig, Renderable, TimestampFormat, Transport,
};
use rust_log_pipeline::formatters::{JsonFormatter, LogfmtFormatter, TextFormatter};
use rust_log_pipeline::transports::{
    FileTransport, MemoryTransport, MultiTransport, QueuedTransport, RotationPolicy,
    SharedBuffer, StreamTransport,
};
use rust_log_pipeline::utils::{Loggable, SharedValue};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn memory_logger(level: LogLevel) -> (Logger, Arc<MemoryTransport>) {
    let memory = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(level)
        .shared_transport(memory.clone())
        .build();
    (logger, memory)
}

#[test]
fn test_info_logger_drops_debug() {
    let (logger, memory) = memory_logger(LogLevel::Info);
    logger.debug("x");
    logger.info("y");

    assert_eq!(memory.messages(), vec!["y"]);
    assert_eq!(logger.metrics().filtered(), 1);
    assert_eq!(logger.metrics().total_logged(), 1);
}

#[test]
fn test_log_injection_prevention() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("injection_test.log");

    let logger = Logger::builder()
        .level(LogLevel::Info)
        .formatter(TextFormatter::new())
        .transport(FileTransport::new(&log_file).expect("Failed to create transport"))
        .build();

    logger.info("User login\nERROR [2024-10-17] Fake error injected\nINFO Continuation");
    logger.flush().expect("Failed to flush");

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    assert!(content.contains("\\n"));
    assert_eq!(content.lines().count(), 1, "Log should be a single line");
}

#[test]
fn test_injected_field_and_data_values_stay_single_line() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let text_file = temp_dir.path().join("text.log");
    let logfmt_file = temp_dir.path().join("logfmt.log");

    let text = Logger::builder()
        .level(LogLevel::Info)
        .formatter(TextFormatter::new())
        .transport(FileTransport::new(&text_file).expect("Failed to create transport"))
        .build();
    text.add_field("user", "bob\n[2025] [ERROR] forged");
    text.info("ok");
    text.flush().expect("Failed to flush");

    let logfmt = Logger::builder()
        .level(LogLevel::Info)
        .formatter(LogfmtFormatter::new())
        .transport(FileTransport::new(&logfmt_file).expect("Failed to create transport"))
        .build();
    logfmt.info_with("ok", "x\nts=0 level=error msg=\"forged\"");
    logfmt.flush().expect("Failed to flush");

    let content = fs::read_to_string(&text_file).expect("Failed to read log file");
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains(r"user=bob\n[2025] [ERROR] forged"));

    let content = fs::read_to_string(&logfmt_file).expect("Failed to read log file");
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains(r#"data="x\nts=0 level=error msg=\"forged\"""#));
}

#[test]
fn test_child_context_reaches_entries() {
    let (logger, memory) = memory_logger(LogLevel::Debug);
    logger.add_field("service", "billing");

    let request = logger.child(
        LogContext::new()
            .with_request_id("req-42")
            .with_field("route", "/invoices"),
    );
    request.info("handled");
    logger.info("parent");

    let entries = memory.entries();
    let child_entry = &entries[0].entry;
    assert_eq!(child_entry.request_id.as_deref(), Some("req-42"));
    assert_eq!(child_entry.context.get("service"), Some(&json!("billing")));
    assert_eq!(child_entry.context.get("route"), Some(&json!("/invoices")));

    let parent_entry = &entries[1].entry;
    assert_eq!(parent_entry.request_id, None);
    assert_eq!(parent_entry.context.get("route"), None);
}

#[test]
fn test_scoped_context_across_calls() {
    let (logger, memory) = memory_logger(LogLevel::Info);
    {
        let _guard = logger.push_context(LogContext::new().with_field("job", "import"));
        logger.info("inside");
    }
    logger.info("outside");

    let entries = memory.entries();
    assert_eq!(entries[0].entry.context.get("job"), Some(&json!("import")));
    assert!(entries[1].entry.context.get("job").is_none());
}

#[test]
fn test_nested_secrets_redacted() {
    let (logger, memory) = memory_logger(LogLevel::Info);
    logger.info_with(
        "signup",
        json!({"password": "x", "nested": {"token": "y", "ok": 1}}),
    );

    let data = memory.last().unwrap().entry.data.clone().unwrap();
    assert_eq!(
        data,
        json!({"password": "[REDACTED]", "nested": {"token": "[REDACTED]", "ok": 1}})
    );
}

#[test]
fn test_circular_payload_terminates() {
    let (logger, memory) = memory_logger(LogLevel::Info);
    let node = SharedValue::new(Loggable::map([("name", "root")]));
    node.insert("self", node.clone());

    logger.info_with("graph", node.clone());

    let data = memory.last().unwrap().entry.data.clone().unwrap();
    assert_eq!(data["name"], "root");
    assert_eq!(data["self"], "[Circular]");
}

#[test]
fn test_error_payload() {
    let (logger, memory) = memory_logger(LogLevel::Error);
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml missing");
    logger.error_with("startup failed", Loggable::from_error(&io));

    let data = memory.last().unwrap().entry.data.clone().unwrap();
    assert_eq!(data["message"], "config.toml missing");
    assert!(data["name"].is_string());
}

#[test]
fn test_json_formatter_to_stream() {
    let buffer = SharedBuffer::new();
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .name("api")
        .formatter(JsonFormatter::new())
        .transport(StreamTransport::new(buffer.clone()))
        .build();

    logger.info_with("ready", json!({"port": 8080}));
    logger.flush().unwrap();

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    let parsed: Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(parsed["level"], "info");
    assert_eq!(parsed["message"], "ready");
    assert_eq!(parsed["logger"], "api");
    assert_eq!(parsed["data"]["port"], 8080);
}

#[test]
fn test_logfmt_with_custom_timestamp() {
    let memory = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .formatter(LogfmtFormatter::new().with_timestamp_format(TimestampFormat::UnixMillis))
        .shared_transport(memory.clone())
        .build();
    logger.info("tick");

    let line = memory.last().unwrap().output.to_text();
    assert!(line.starts_with("ts="));
    assert!(line.contains("level=info msg=\"tick\""));
    let millis = line
        .strip_prefix("ts=")
        .and_then(|rest| rest.split(' ').next())
        .unwrap();
    assert!(millis.parse::<i64>().is_ok());
}

#[test]
fn test_rotating_file_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.log");
    let file = Arc::new(
        FileTransport::with_policy(
            &path,
            RotationPolicy::new().with_max_bytes(200).with_max_backups(2),
        )
        .unwrap(),
    );
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .formatter(TextFormatter::new().with_call_site(false))
        .shared_transport(file.clone())
        .build();

    for i in 0..50 {
        logger.info(format!("message number {}", i));
    }
    logger.flush().unwrap();

    assert!(file.backup_path(1).exists());
    assert!(file.backup_path(2).exists());
    assert!(!file.backup_path(3).exists());
    let current = fs::read_to_string(&path).unwrap();
    assert!(current.trim_end().ends_with("message number 49"));
}

#[test]
fn test_failing_transport_does_not_block_others() {
    struct Down;
    impl Transport for Down {
        fn write(&self, _record: &rust_log_pipeline::core::FormattedEntry) -> rust_log_pipeline::Result<()> {
            Err(LoggerError::transport("down", "connection refused"))
        }
        fn name(&self) -> &str {
            "down"
        }
    }

    let healthy = Arc::new(MemoryTransport::new());
    let fallback = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .transport(Down)
        .shared_transport(healthy.clone())
        .shared_fallback(fallback.clone())
        .build();

    logger.info("still delivered");

    assert_eq!(healthy.messages(), vec!["still delivered"]);
    assert_eq!(logger.metrics().transport_failures(), 1);
    let report = fallback.last().unwrap();
    assert_eq!(report.entry.level, LogLevel::Error);
    assert_eq!(report.entry.data.as_ref().unwrap()["transport"], "down");
}

#[test]
fn test_multi_transport_fan_out() {
    let a = Arc::new(MemoryTransport::new());
    let b = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .transport(MultiTransport::new().with_shared(a.clone()).with_shared(b.clone()))
        .build();

    logger.warn("both");
    assert_eq!(a.messages(), vec!["both"]);
    assert_eq!(b.messages(), vec!["both"]);
}

#[test]
fn test_rate_limit_with_manual_clock() {
    let clock = Arc::new(ManualClock::new());
    let memory = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .clock(clock.clone())
        .rate_limit(RateLimitConfig::new(2, Duration::from_secs(1)))
        .shared_transport(memory.clone())
        .build();

    for i in 0..5 {
        logger.info(format!("burst {}", i));
    }
    assert_eq!(memory.len(), 2);
    assert_eq!(logger.metrics().rate_limited(), 3);

    clock.advance(Duration::from_millis(1001));
    logger.info("after window");
    assert_eq!(memory.len(), 3);
}

#[test]
fn test_background_dispatch_from_many_threads() {
    let memory = Arc::new(MemoryTransport::new());
    let logger = Arc::new(
        Logger::builder()
            .level(LogLevel::Info)
            .background(4096)
            .shared_transport(memory.clone())
            .build(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..100 {
                    logger.info(format!("t{}-{}", t, i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.flush().unwrap();

    assert_eq!(memory.len(), 400);
    // per-thread order survives the shared FIFO
    let t0: Vec<String> = memory
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("t0-"))
        .collect();
    let expected: Vec<String> = (0..100).map(|i| format!("t0-{}", i)).collect();
    assert_eq!(t0, expected);
    assert!(logger.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_call_site_capture() {
    let memory = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .capture_location(LocationCapture::Caller)
        .shared_transport(memory.clone())
        .build();

    logger.info("located");
    let site = memory.last().unwrap().entry.call_site.clone().unwrap();
    assert_eq!(site.file.as_deref(), Some(file!()));
    assert!(site.line.is_some());
}

#[test]
fn test_timing_entry() {
    let (logger, memory) = memory_logger(LogLevel::Debug);
    let value = logger.measure("compute", || 6 * 7);
    assert_eq!(value, 42);

    let record = memory.last().unwrap();
    assert!(record.entry.message.starts_with("compute completed in"));
    assert!(record.entry.context.timing().is_some());
}

#[test]
fn test_settings_configure_builder() {
    let settings = LoggerSettings::from_json(
        r#"{"level": "http", "format": "json", "name": "gateway", "max_depth": 1}"#,
    )
    .unwrap();
    let memory = Arc::new(MemoryTransport::new());
    let logger = Logger::builder()
        .settings(&settings)
        .unwrap()
        .shared_transport(memory.clone())
        .build();

    assert_eq!(logger.level(), LogLevel::Http);
    logger.http_with("GET /", json!({"a": {"b": {"c": 1}}}));
    logger.verbose("hidden");

    let record = memory.last().unwrap();
    match record.output {
        Renderable::Structured(ref value) => assert_eq!(value["logger"], "gateway"),
        ref other => panic!("expected structured output, got {:?}", other),
    }
    assert_eq!(
        record.entry.data,
        Some(json!({"a": "[Max Depth Reached]"}))
    );
    assert_eq!(memory.len(), 1);
}

#[test]
fn test_env_values_fail_fast_on_bad_level() {
    let err = LoggerConfig::from_vars(Some("production"), Some("shouting")).unwrap_err();
    assert!(matches!(err, LoggerError::InvalidLevel { .. }));

    let config = LoggerConfig::from_vars(Some("production"), None).unwrap();
    let logger = Logger::new(config).unwrap();
    assert_eq!(logger.level(), LogLevel::Info);
}

#[tokio::test]
async fn test_queued_transport_delivers_in_order_on_close() {
    let memory = Arc::new(MemoryTransport::new());
    let queued = QueuedTransport::new(memory.clone(), 10, Duration::from_secs(30)).unwrap();
    let logger = Logger::builder()
        .level(LogLevel::Info)
        .transport(queued)
        .build();

    for i in 0..25 {
        logger.info(format!("batched {}", i));
    }
    logger.close().await.unwrap();

    let expected: Vec<String> = (0..25).map(|i| format!("batched {}", i)).collect();
    assert_eq!(memory.messages(), expected);
}
