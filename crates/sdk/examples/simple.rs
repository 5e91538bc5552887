//! Simple SDK Example
//!
//! Demonstrates basic usage of the Segmill SDK.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package segmill-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use segmill_sdk::{SegmillClient, SubmitRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Segmill SDK - Simple Example");
    println!("================================\n");

    // 1. Connect to daemon
    println!("1. Connecting to daemon...");
    let client = SegmillClient::connect("http://127.0.0.1:9630").await?;
    println!("   ✓ Connected\n");

    // 2. Submit a segment creation job
    println!("2. Submitting a segment job...");
    let submit_response = client
        .submit(SubmitRequest {
            credential_ref: "acct-demo".to_string(),
            segment_ids: vec![
                "engaged-30d".to_string(),
                "repeat-buyers".to_string(),
                "high-value".to_string(),
            ],
            currency_symbol: Some("$".to_string()),
            thresholds: None,
        })
        .await?;

    println!("   ✓ Job submitted:");
    println!("     - ID: {}", submit_response.job_id);
    println!("     - Status: {}", submit_response.status);
    println!("     - Segments: {}\n", submit_response.total_segments);

    // 3. Poll until the job settles
    println!("3. Waiting for the job to settle...");
    let report = loop {
        let report = client.status(&submit_response.job_id).await?;
        println!(
            "   {} {}/{}",
            report.status, report.segments_processed, report.total_segments
        );
        if report.is_terminal() {
            break report;
        }
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    };
    println!();

    // 4. Print the outcome per segment
    println!("4. Final report:");
    for segment_id in &report.completed_segment_ids {
        println!("   ✓ {}", segment_id);
    }
    for (segment_id, reason) in &report.failed_segments {
        println!("   ✗ {}: {}", segment_id, reason);
    }
    if let Some(reason) = &report.failure_reason {
        println!("   ⚠ Job failed: {}", reason);
    }

    println!("\n✓ Example completed successfully!");

    Ok(())
}
