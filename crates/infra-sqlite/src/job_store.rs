// SQLite JobStore Implementation

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use segmill_core::domain::{
    JobParameters, JobStatus, ProvisionJob, RateLimitKind, SegmentLedger,
};
use segmill_core::error::{AppError, Result};
use segmill_core::port::JobStore;
use sqlx::SqlitePool;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed. For provision_jobs this is
                        // either a duplicate id or a second active job for the
                        // same credential.
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => {
                        // SQLITE_BUSY - database is locked
                        AppError::Database(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

const STATUS_ORDER: [JobStatus; 6] = [
    JobStatus::Pending,
    JobStatus::InProgress,
    JobStatus::WaitingRetry,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &ProvisionJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO provision_jobs (
                id, credential_ref, status,
                pending_ids, completed_ids, failed_ids, params,
                total_segments, segments_processed,
                retry_at, rate_limit_kind, failure_reason,
                created_at, started_at, completed_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.credential_ref)
        .bind(job.status.to_string())
        .bind(serde_json::to_string(job.ledger.pending())?)
        .bind(serde_json::to_string(job.ledger.completed())?)
        .bind(serde_json::to_string(job.ledger.failed())?)
        .bind(serde_json::to_string(&job.params)?)
        .bind(job.total_segments())
        .bind(job.segments_processed())
        .bind(job.retry_at)
        .bind(job.rate_limit_kind.map(|k| k.to_string()))
        .bind(&job.failure_reason)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Option<ProvisionJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM provision_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_active_by_credential(
        &self,
        credential_ref: &str,
    ) -> Result<Option<ProvisionJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM provision_jobs
            WHERE credential_ref = ? AND status IN (?, ?, ?)
            LIMIT 1
            "#,
        )
        .bind(credential_ref)
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::InProgress.to_string())
        .bind(JobStatus::WaitingRetry.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_due(&self, job_id: &str, now_millis: i64) -> Result<Option<ProvisionJob>> {
        // Single conditional UPDATE so concurrent passes cannot both claim.
        // Clearing the retry fields here keeps a resumed job identical to a
        // first-run job.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE provision_jobs
            SET status = ?,
                retry_at = NULL,
                rate_limit_kind = NULL,
                started_at = COALESCE(started_at, ?),
                updated_at = ?
            WHERE id = ?
              AND (
                    status = ?
                    OR (status = ? AND (retry_at IS NULL OR retry_at <= ?))
                  )
            RETURNING *
            "#,
        )
        .bind(JobStatus::InProgress.to_string())
        .bind(now_millis)
        .bind(now_millis)
        .bind(job_id)
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::WaitingRetry.to_string())
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn persist_progress(&self, job: &ProvisionJob) -> Result<bool> {
        // Guarded on the stored row still being IN_PROGRESS, i.e. the claim
        // this pass took. A cancelled or reclaimed row fails the guard.
        let result = sqlx::query(
            r#"
            UPDATE provision_jobs
            SET status = ?,
                pending_ids = ?,
                completed_ids = ?,
                failed_ids = ?,
                segments_processed = ?,
                retry_at = ?,
                rate_limit_kind = ?,
                failure_reason = ?,
                completed_at = ?,
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(job.status.to_string())
        .bind(serde_json::to_string(job.ledger.pending())?)
        .bind(serde_json::to_string(job.ledger.completed())?)
        .bind(serde_json::to_string(job.ledger.failed())?)
        .bind(job.segments_processed())
        .bind(job.retry_at)
        .bind(job.rate_limit_kind.map(|k| k.to_string()))
        .bind(&job.failure_reason)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(&job.id)
        .bind(JobStatus::InProgress.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, job_id: &str, now_millis: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE provision_jobs
            SET status = ?,
                retry_at = NULL,
                rate_limit_kind = NULL,
                completed_at = ?,
                updated_at = ?
            WHERE id = ? AND status IN (?, ?, ?)
            "#,
        )
        .bind(JobStatus::Cancelled.to_string())
        .bind(now_millis)
        .bind(now_millis)
        .bind(job_id)
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::InProgress.to_string())
        .bind(JobStatus::WaitingRetry.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<ProvisionJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM provision_jobs
            WHERE status = ?
               OR (status = ? AND (retry_at IS NULL OR retry_at <= ?))
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(JobStatus::Pending.to_string())
        .bind(JobStatus::WaitingRetry.to_string())
        .bind(now_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn find_by_status(&self, status: JobStatus, limit: i64) -> Result<Vec<ProvisionJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM provision_jobs
            WHERE status = ?
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<ProvisionJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM provision_jobs
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn release_stale(&self, stale_before_millis: i64, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE provision_jobs
            SET status = ?, updated_at = ?
            WHERE status = ? AND updated_at < ?
            "#,
        )
        .bind(JobStatus::Pending.to_string())
        .bind(now_millis)
        .bind(JobStatus::InProgress.to_string())
        .bind(stale_before_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM provision_jobs
            WHERE status IN (?, ?, ?) AND updated_at < ?
            "#,
        )
        .bind(JobStatus::Completed.to_string())
        .bind(JobStatus::Failed.to_string())
        .bind(JobStatus::Cancelled.to_string())
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn status_counts(&self) -> Result<Vec<(JobStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM provision_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(STATUS_ORDER
            .iter()
            .map(|status| {
                let label = status.to_string();
                let count = rows
                    .iter()
                    .find(|(raw, _)| *raw == label)
                    .map(|(_, count)| *count)
                    .unwrap_or(0);
                (*status, count)
            })
            .collect())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    credential_ref: String,
    status: String,
    pending_ids: String,
    completed_ids: String,
    failed_ids: String,
    params: String,
    total_segments: i64,
    segments_processed: i64,
    retry_at: Option<i64>,
    rate_limit_kind: Option<String>,
    failure_reason: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    updated_at: i64,
}

impl JobRow {
    /// Strict reconstruction. A row whose ledger buckets overlap or whose
    /// counters disagree with the ledger is corrupt and must not be
    /// processed.
    fn into_job(self) -> Result<ProvisionJob> {
        let status = parse_status(&self.status)?;
        let rate_limit_kind = match self.rate_limit_kind.as_deref() {
            None => None,
            Some("MINUTE") => Some(RateLimitKind::Minute),
            Some("DAILY") => Some(RateLimitKind::Daily),
            Some(other) => {
                return Err(AppError::Database(format!(
                    "job {}: unknown rate limit kind '{}'",
                    self.id, other
                )))
            }
        };

        let pending: Vec<String> = serde_json::from_str(&self.pending_ids)?;
        let completed: BTreeSet<String> = serde_json::from_str(&self.completed_ids)?;
        let failed: BTreeMap<String, String> = serde_json::from_str(&self.failed_ids)?;
        let ledger = SegmentLedger::from_parts(pending, completed, failed)?;
        let params: JobParameters = serde_json::from_str(&self.params)?;

        if self.total_segments != ledger.total() as i64
            || self.segments_processed != ledger.processed() as i64
        {
            return Err(AppError::Database(format!(
                "job {}: stored counters disagree with ledger ({}/{} vs {}/{})",
                self.id,
                self.segments_processed,
                self.total_segments,
                ledger.processed(),
                ledger.total()
            )));
        }

        Ok(ProvisionJob {
            id: self.id,
            credential_ref: self.credential_ref,
            status,
            ledger,
            params,
            retry_at: self.retry_at,
            rate_limit_kind,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    match raw {
        "PENDING" => Ok(JobStatus::Pending),
        "IN_PROGRESS" => Ok(JobStatus::InProgress),
        "WAITING_RETRY" => Ok(JobStatus::WaitingRetry),
        "COMPLETED" => Ok(JobStatus::Completed),
        "FAILED" => Ok(JobStatus::Failed),
        "CANCELLED" => Ok(JobStatus::Cancelled),
        other => Err(AppError::Database(format!("unknown job status '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn sample_job(id: &str, credential: &str, created_at: i64) -> ProvisionJob {
        let mut params = JobParameters::default();
        params.thresholds.insert("high_value_spend".to_string(), 750.0);
        ProvisionJob::new(
            id.to_string(),
            credential.to_string(),
            vec![
                "engaged-30d".to_string(),
                "repeat-buyers".to_string(),
                "high-value".to_string(),
            ],
            params,
            created_at,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let store = setup_test_db().await;
        let job = sample_job("j1", "acct-a", 1_000);
        store.insert(&job).await.unwrap();

        let loaded = store.find_by_id("j1").await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.params.threshold("high_value_spend"), Some(750.0));

        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_credential_uniqueness() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();

        let err = store
            .insert(&sample_job("j2", "acct-a", 2_000))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Different credential is fine.
        store.insert(&sample_job("j3", "acct-b", 3_000)).await.unwrap();

        // Finish the first job, then a new one for acct-a is allowed.
        let mut claimed = store.claim_due("j1", 4_000).await.unwrap().unwrap();
        claimed.record_created("engaged-30d", 4_100).unwrap();
        claimed.record_created("repeat-buyers", 4_200).unwrap();
        claimed.record_created("high-value", 4_300).unwrap();
        claimed.complete(4_400).unwrap();
        assert!(store.persist_progress(&claimed).await.unwrap());

        store.insert(&sample_job("j4", "acct-a", 5_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_due_takes_pending_job() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();

        let claimed = store.claim_due("j1", 2_000).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::InProgress);
        assert_eq!(claimed.started_at, Some(2_000));
        assert_eq!(claimed.updated_at, 2_000);

        // Already claimed: a second claim must lose.
        assert!(store.claim_due("j1", 2_001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_due_respects_retry_time() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();

        let mut claimed = store.claim_due("j1", 2_000).await.unwrap().unwrap();
        claimed.record_created("engaged-30d", 2_100).unwrap();
        claimed
            .park(60_000, RateLimitKind::Minute, 2_200)
            .unwrap();
        assert!(store.persist_progress(&claimed).await.unwrap());

        assert!(store.claim_due("j1", 59_999).await.unwrap().is_none());

        let resumed = store.claim_due("j1", 60_000).await.unwrap().unwrap();
        assert_eq!(resumed.status, JobStatus::InProgress);
        assert_eq!(resumed.retry_at, None);
        assert_eq!(resumed.rate_limit_kind, None);
        // started_at keeps the first pass's value.
        assert_eq!(resumed.started_at, Some(2_000));
        // Progress from the first pass is intact.
        assert!(resumed.ledger.completed().contains("engaged-30d"));
    }

    #[tokio::test]
    async fn test_persist_guard_fails_after_cancel() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();
        let mut claimed = store.claim_due("j1", 2_000).await.unwrap().unwrap();

        assert!(store.cancel("j1", 2_500).await.unwrap());

        claimed.record_created("engaged-30d", 2_600).unwrap();
        assert!(!store.persist_progress(&claimed).await.unwrap());

        // The cancelled row is untouched by the failed persist.
        let stored = store.find_by_id("j1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.segments_processed(), 0);
    }

    #[tokio::test]
    async fn test_cancel_only_touches_active_jobs() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();

        assert!(store.cancel("j1", 2_000).await.unwrap());
        // Second cancel finds nothing active.
        assert!(!store.cancel("j1", 3_000).await.unwrap());
        assert!(!store.cancel("missing", 3_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_due_orders_and_limits() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j2", "acct-b", 2_000)).await.unwrap();
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();
        store.insert(&sample_job("j3", "acct-c", 3_000)).await.unwrap();

        // Park j3 into the future.
        let mut parked = store.claim_due("j3", 4_000).await.unwrap().unwrap();
        parked.park(99_000, RateLimitKind::Minute, 4_100).unwrap();
        assert!(store.persist_progress(&parked).await.unwrap());

        let due = store.find_due(5_000, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j1", "j2"]);

        let due = store.find_due(99_500, 10).await.unwrap();
        assert_eq!(due.len(), 3);

        let due = store.find_due(99_500, 1).await.unwrap();
        assert_eq!(due[0].id, "j1");
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();
        store.insert(&sample_job("j2", "acct-b", 1_000)).await.unwrap();
        store.claim_due("j1", 2_000).await.unwrap().unwrap();
        store.claim_due("j2", 50_000).await.unwrap().unwrap();

        // Only the claim untouched since before 10_000 is released.
        let released = store.release_stale(10_000, 60_000).await.unwrap();
        assert_eq!(released, 1);

        let j1 = store.find_by_id("j1").await.unwrap().unwrap();
        assert_eq!(j1.status, JobStatus::Pending);
        let j2 = store.find_by_id("j2").await.unwrap().unwrap();
        assert_eq!(j2.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_purge_terminal_rows() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();
        assert!(store.cancel("j1", 2_000).await.unwrap());
        store.insert(&sample_job("j2", "acct-a", 3_000)).await.unwrap();

        let purged = store.purge_terminal_older_than(10_000).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.find_by_id("j1").await.unwrap().is_none());
        assert!(store.find_by_id("j2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_status_counts_cover_all_statuses() {
        let store = setup_test_db().await;
        store.insert(&sample_job("j1", "acct-a", 1_000)).await.unwrap();
        store.insert(&sample_job("j2", "acct-b", 1_000)).await.unwrap();
        store.claim_due("j2", 2_000).await.unwrap().unwrap();

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.len(), 6);
        assert_eq!(counts[0], (JobStatus::Pending, 1));
        assert_eq!(counts[1], (JobStatus::InProgress, 1));
        assert_eq!(counts[3], (JobStatus::Completed, 0));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_rows_are_rejected() {
        let store = setup_test_db().await;
        // Hand-craft a row where "a" is both pending and completed.
        sqlx::query(
            r#"
            INSERT INTO provision_jobs (
                id, credential_ref, status,
                pending_ids, completed_ids, failed_ids, params,
                total_segments, segments_processed,
                created_at, updated_at
            ) VALUES (?, ?, 'PENDING', '["a"]', '["a"]', '{}', '{}', 2, 1, 0, 0)
            "#,
        )
        .bind("corrupt")
        .bind("acct-x")
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.find_by_id("corrupt").await.unwrap_err();
        assert!(err.to_string().contains("more than one ledger bucket"));
    }
}
