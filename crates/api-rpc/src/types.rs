//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use std::collections::BTreeMap;

use segmill_core::domain::{JobStatus, ProvisionJob};
use serde::{Deserialize, Serialize};

/// segments.submit.v1 - Submit a provisioning job
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub credential_ref: String,
    pub segment_ids: Vec<String>,
    #[serde(default)]
    pub currency_symbol: Option<String>,
    #[serde(default)]
    pub thresholds: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    pub total_segments: i64,
}

/// segments.status.v1 - Full row view of one job
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub credential_ref: String,
    pub status: String,
    pub total_segments: i64,
    pub segments_processed: i64,
    pub pending_segment_ids: Vec<String>,
    pub completed_segment_ids: Vec<String>,
    /// Permanently failed segment ids with their recorded reasons.
    pub failed_segments: BTreeMap<String, String>,
    pub retry_at: Option<i64>,
    pub rate_limit_kind: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl From<&ProvisionJob> for JobReport {
    fn from(job: &ProvisionJob) -> Self {
        Self {
            job_id: job.id.clone(),
            credential_ref: job.credential_ref.clone(),
            status: job.status.to_string(),
            total_segments: job.total_segments(),
            segments_processed: job.segments_processed(),
            pending_segment_ids: job.ledger.pending().to_vec(),
            completed_segment_ids: job.ledger.completed().iter().cloned().collect(),
            failed_segments: job.ledger.failed().clone(),
            retry_at: job.retry_at,
            rate_limit_kind: job.rate_limit_kind.map(|k| k.to_string()),
            failure_reason: job.failure_reason.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: job.updated_at,
        }
    }
}

/// segments.cancel.v1 - Cancel a job
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
    pub status: String,
}

/// segments.list.v1 - Recent jobs, newest first
#[derive(Debug, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub jobs: Vec<JobReport>,
}

/// admin.stats.v1 - Get system statistics
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub in_progress_jobs: i64,
    pub waiting_retry_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}
