//! File logging example
//!
//! Demonstrates file output with size rotation, JSON lines and fan-out.
//!
//! Run with: cargo run --example file_logging

use rust_log_pipeline::prelude::*;
use rust_log_pipeline::transports::{FileTransport, RotationPolicy};
use serde_json::json;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Rust Log Pipeline - File Logging Example ===\n");

    let policy = RotationPolicy::new()
        .with_max_bytes(4 * 1024)
        .with_max_backups(3)
        .with_compression(true);
    let file = Arc::new(FileTransport::with_policy("logs/app.log", policy)?);

    let logger = Logger::builder()
        .level(LogLevel::Debug)
        .name("file-demo")
        .formatter(JsonFormatter::new())
        .transport(
            MultiTransport::new()
                .with_shared(file.clone())
                .with(ConsoleTransport::new()),
        )
        .build();

    println!("1. Writing JSON lines to {}", file.path().display());
    for i in 0..200 {
        logger.debug_with("Processing record", json!({"record": i, "status": "ok"}));
    }
    logger.flush()?;

    println!("\n2. Rotated backups:");
    for index in 1..=3 {
        let plain = file.backup_path(index);
        let compressed = file.compressed_backup_path(index);
        if compressed.exists() {
            println!("   {}", compressed.display());
        } else if plain.exists() {
            println!("   {}", plain.display());
        }
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
