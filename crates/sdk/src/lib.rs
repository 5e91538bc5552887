//! Segmill SDK - Rust Client Library
//!
//! Provides a convenient client for the Segmill segment job daemon.
//!
//! # Example
//!
//! ```no_run
//! use segmill_sdk::{SegmillClient, SubmitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to daemon
//!     let client = SegmillClient::connect("http://127.0.0.1:9630").await?;
//!
//!     // Submit a job
//!     let response = client.submit(SubmitRequest {
//!         credential_ref: "acct-7".to_string(),
//!         segment_ids: vec![
//!             "engaged-30d".to_string(),
//!             "repeat-buyers".to_string(),
//!             "high-value".to_string(),
//!         ],
//!         currency_symbol: Some("$".to_string()),
//!         thresholds: None,
//!     }).await?;
//!
//!     println!("Job submitted: {}", response.job_id);
//!
//!     // Poll until it settles
//!     loop {
//!         let report = client.status(&response.job_id).await?;
//!         println!("{}: {}/{}", report.status, report.segments_processed, report.total_segments);
//!         if report.is_terminal() {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::SegmillClient;
pub use error::{Result, SdkError};
pub use types::{
    CancelRequest, CancelResponse, JobReport, ListRequest, ListResponse, StatsResponse,
    StatusRequest, SubmitRequest, SubmitResponse,
};
