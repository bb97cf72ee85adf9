//! Basic logger usage example
//!
//! Demonstrates console logging, levels, child loggers and payloads.
//!
//! Run with: cargo run --example basic_usage

use rust_log_pipeline::prelude::*;
use rust_log_pipeline::{info, warn};
use serde_json::json;

fn main() -> Result<()> {
    println!("=== Rust Log Pipeline - Basic Usage Example ===\n");

    let logger = Logger::builder()
        .level(LogLevel::Silly)
        .name("demo")
        .formatter(TextFormatter::new().with_colors(true))
        .transport(ConsoleTransport::new())
        .build();

    println!("1. Logging at every level:");
    logger.error("This is an error message");
    logger.warn("This is a warning message");
    logger.info("This is an info message");
    logger.http("GET /health 200");
    logger.verbose("This is a verbose message");
    logger.debug("This is a debug message");
    logger.silly("This is a silly message");

    println!("\n2. Raising the level to INFO:");
    logger.set_level(LogLevel::Info);
    logger.debug("Debug message (hidden)");
    logger.info("Info message (visible)");

    println!("\n3. Child logger with request context:");
    let request = logger.child(
        LogContext::new()
            .with_request_id("req-1001")
            .with_field("route", "/checkout"),
    );
    request.info("Handling request");
    request.info_with(
        "Payment submitted",
        json!({"amount": 42.5, "card_token": "tok_visa", "password": "hunter2"}),
    );

    println!("\n4. Macros and timing:");
    let items = 3;
    info!(logger, "Cart contains {} items", items);
    warn!(logger, data: json!({"latency_ms": 840}); "Slow upstream: {}", "inventory");
    let total = logger.measure("price_calculation", || (1..=1000).sum::<u64>());
    logger.info(format!("Total: {}", total));

    logger.flush()?;
    println!("\n=== Example completed successfully! ===");
    Ok(())
}
