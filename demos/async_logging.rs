//! Async logging example
//!
//! Demonstrates background dispatch from many threads, batched delivery
//! through a queued transport and rate limiting.
//!
//! Run with: cargo run --example async_logging

use rust_log_pipeline::prelude::*;
use rust_log_pipeline::transports::QueuedTransport;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Rust Log Pipeline - Async Logging Example ===\n");

    let console: Arc<dyn Transport> = Arc::new(ConsoleTransport::new());
    let batched = QueuedTransport::new(console, 50, Duration::from_millis(250))?;

    let logger = Arc::new(
        Logger::builder()
            .level(LogLevel::Info)
            .background(1000)
            .rate_limit(RateLimitConfig::new(500, Duration::from_secs(1)))
            .transport(batched)
            .build(),
    );

    println!("1. Logging from 4 threads:");
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let logger = logger.child(LogContext::new().with_field("worker", worker));
            thread::spawn(move || {
                for i in 0..25 {
                    logger.info(format!("Worker {} message #{}", worker, i));
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }

    println!("\n2. Bursting past the rate limit:");
    for i in 0..1000 {
        logger.info(format!("Burst message #{}", i));
    }

    logger.close().await?;

    let metrics = logger.metrics().snapshot();
    println!("\n3. Metrics:");
    println!("   delivered:    {}", metrics.total_logged);
    println!("   rate limited: {}", metrics.rate_limited);
    println!("   dropped:      {}", metrics.dropped);

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
