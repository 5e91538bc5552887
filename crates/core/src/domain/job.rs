use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::SegmentId;
use crate::domain::error::{DomainError, Result};
use crate::domain::ledger::SegmentLedger;

pub type JobId = String;
pub type CredentialRef = String;

/// Lifecycle of a provisioning job. A job is claimed by exactly one pass at a
/// time; `WAITING_RETRY` means the pass was parked by a rate limit and must
/// not be picked up again before `retry_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    WaitingRetry,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Active statuses count against the one-job-per-credential rule.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobStatus::WaitingRetry => write!(f, "WAITING_RETRY"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Which rate-limit window parked the job. Determines how far out the
/// retry time was pushed and what operators see in status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitKind {
    Minute,
    Daily,
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitKind::Minute => write!(f, "MINUTE"),
            RateLimitKind::Daily => write!(f, "DAILY"),
        }
    }
}

fn default_currency() -> String {
    "$".to_string()
}

/// Caller-supplied rendering inputs, persisted with the job so resumed
/// passes produce identical segment definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    #[serde(default = "default_currency")]
    pub currency_symbol: String,
    /// Overrides for named threshold values in segment templates.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency(),
            thresholds: BTreeMap::new(),
        }
    }
}

impl JobParameters {
    pub fn threshold(&self, key: &str) -> Option<f64> {
        self.thresholds.get(key).copied()
    }
}

/// A provisioning job: one request to materialize a batch of segments in the
/// account behind `credential_ref`. All progress lives in the ledger so any
/// later pass can resume from the exact segment where the previous one
/// stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionJob {
    pub id: JobId,
    pub credential_ref: CredentialRef,
    pub status: JobStatus,
    pub ledger: SegmentLedger,
    pub params: JobParameters,
    /// Epoch millis before which a WAITING_RETRY job must not be claimed.
    pub retry_at: Option<i64>,
    pub rate_limit_kind: Option<RateLimitKind>,
    /// Job-fatal reason. Segment-level failures live in the ledger instead.
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl ProvisionJob {
    pub fn new(
        id: JobId,
        credential_ref: CredentialRef,
        segment_ids: Vec<SegmentId>,
        params: JobParameters,
        now_millis: i64,
    ) -> Self {
        Self {
            id,
            credential_ref,
            status: JobStatus::Pending,
            ledger: SegmentLedger::new(segment_ids),
            params,
            retry_at: None,
            rate_limit_kind: None,
            failure_reason: None,
            created_at: now_millis,
            started_at: None,
            completed_at: None,
            updated_at: now_millis,
        }
    }

    pub fn total_segments(&self) -> i64 {
        self.ledger.total() as i64
    }

    pub fn segments_processed(&self) -> i64 {
        self.ledger.processed() as i64
    }

    /// Whether a pass may claim this job right now.
    pub fn is_due(&self, now_millis: i64) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::WaitingRetry => self.retry_at.map_or(true, |at| now_millis >= at),
            _ => false,
        }
    }

    /// Take the job for the current pass. Clears any parked-retry state so a
    /// resumed job looks exactly like one that was never rate limited.
    pub fn claim(&mut self, now_millis: i64) -> Result<()> {
        match self.status {
            JobStatus::Pending | JobStatus::WaitingRetry => {
                self.status = JobStatus::InProgress;
                self.retry_at = None;
                self.rate_limit_kind = None;
                if self.started_at.is_none() {
                    self.started_at = Some(now_millis);
                }
                self.updated_at = now_millis;
                Ok(())
            }
            _ => Err(self.invalid_transition(JobStatus::InProgress)),
        }
    }

    /// Record one segment as materialized (created, or already present).
    pub fn record_created(&mut self, segment_id: &str, now_millis: i64) -> Result<()> {
        self.ensure_in_progress("record a segment outcome")?;
        self.ledger.mark_completed(segment_id)?;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record one segment as permanently failed without failing the job.
    pub fn record_failed_segment(
        &mut self,
        segment_id: &str,
        reason: impl Into<String>,
        now_millis: i64,
    ) -> Result<()> {
        self.ensure_in_progress("record a segment outcome")?;
        self.ledger.mark_failed(segment_id, reason)?;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Park the job until `retry_at` after the ESP throttled a create call.
    pub fn park(
        &mut self,
        retry_at_millis: i64,
        kind: RateLimitKind,
        now_millis: i64,
    ) -> Result<()> {
        if self.status != JobStatus::InProgress {
            return Err(self.invalid_transition(JobStatus::WaitingRetry));
        }
        self.status = JobStatus::WaitingRetry;
        self.retry_at = Some(retry_at_millis);
        self.rate_limit_kind = Some(kind);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Finish the job. Every requested segment must have reached the
    /// completed or failed bucket first.
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::InProgress {
            return Err(self.invalid_transition(JobStatus::Completed));
        }
        if !self.ledger.is_exhausted() {
            return Err(DomainError::ValidationError(format!(
                "cannot complete job {}: {} segment(s) still pending",
                self.id,
                self.ledger.pending().len()
            )));
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Abort the whole job for a non-segment-scoped reason, e.g. the metric
    /// inventory could not be fetched or the credential was rejected.
    pub fn fail(&mut self, reason: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::InProgress {
            return Err(self.invalid_transition(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Operator-requested cancellation. Only non-terminal jobs can be
    /// cancelled; segments already created in the ESP stay created.
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(JobStatus::Cancelled));
        }
        self.status = JobStatus::Cancelled;
        self.retry_at = None;
        self.rate_limit_kind = None;
        self.completed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    fn ensure_in_progress(&self, action: &str) -> Result<()> {
        if self.status != JobStatus::InProgress {
            return Err(DomainError::ValidationError(format!(
                "cannot {} while job {} is {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    fn invalid_transition(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStatusTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}
