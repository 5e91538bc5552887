//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate. Statuses travel as
//! plain strings (`PENDING`, `IN_PROGRESS`, `WAITING_RETRY`, `COMPLETED`,
//! `FAILED`, `CANCELLED`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request to submit a segment creation job
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub credential_ref: String,
    pub segment_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, f64>>,
}

/// Response from submit operation
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    pub total_segments: i64,
}

/// Request for one job's full row
#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest {
    pub job_id: String,
}

/// Full view of one job
#[derive(Debug, Clone, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub credential_ref: String,
    pub status: String,
    pub total_segments: i64,
    pub segments_processed: i64,
    pub pending_segment_ids: Vec<String>,
    pub completed_segment_ids: Vec<String>,
    pub failed_segments: BTreeMap<String, String>,
    pub retry_at: Option<i64>,
    pub rate_limit_kind: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl JobReport {
    /// True once the job can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "COMPLETED" | "FAILED" | "CANCELLED")
    }
}

/// Request to cancel a job
#[derive(Debug, Clone, Serialize)]
pub struct CancelRequest {
    pub job_id: String,
}

/// Response from cancel operation
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
    pub status: String,
}

/// Request to list recent jobs
#[derive(Debug, Clone, Serialize)]
pub struct ListRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub limit: i64,
}

/// Response from list operation
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub jobs: Vec<JobReport>,
}

/// Daemon statistics
#[derive(Debug, Clone, Deserialize)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_omits_unset_options() {
        let request = SubmitRequest {
            credential_ref: "acct-1".to_string(),
            segment_ids: vec!["engaged-30d".to_string()],
            currency_symbol: None,
            thresholds: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("currency_symbol").is_none());
        assert!(value.get("thresholds").is_none());
    }

    #[test]
    fn test_job_report_terminal_statuses() {
        let raw = serde_json::json!({
            "job_id": "j-1",
            "credential_ref": "acct-1",
            "status": "WAITING_RETRY",
            "total_segments": 5,
            "segments_processed": 3,
            "pending_segment_ids": ["a", "b"],
            "completed_segment_ids": ["c", "d", "e"],
            "failed_segments": {},
            "retry_at": 1_700_000_060_500_i64,
            "rate_limit_kind": "MINUTE",
            "failure_reason": null,
            "created_at": 1_700_000_000_000_i64,
            "started_at": 1_700_000_000_100_i64,
            "completed_at": null,
            "updated_at": 1_700_000_000_200_i64,
        });
        let report: JobReport = serde_json::from_value(raw).unwrap();
        assert!(!report.is_terminal());
        assert_eq!(report.rate_limit_kind.as_deref(), Some("MINUTE"));

        for status in ["COMPLETED", "FAILED", "CANCELLED"] {
            let done = JobReport {
                status: status.to_string(),
                ..report.clone()
            };
            assert!(done.is_terminal());
        }
    }
}
