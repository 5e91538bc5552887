use async_trait::async_trait;

use crate::domain::{JobStatus, ProvisionJob};
use crate::error::Result;

/// Durable storage for provisioning jobs.
///
/// Claim and persist operations are conditional writes: they only take
/// effect when the stored row is still in the status the caller believes it
/// is in. That is what makes a pass safe against concurrent passes,
/// cancellation, and stale-claim recovery.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new PENDING job. Fails with `Conflict` when the credential
    /// already has a non-terminal job.
    async fn insert(&self, job: &ProvisionJob) -> Result<()>;

    async fn find_by_id(&self, job_id: &str) -> Result<Option<ProvisionJob>>;

    /// The credential's current non-terminal job, if any.
    async fn find_active_by_credential(
        &self,
        credential_ref: &str,
    ) -> Result<Option<ProvisionJob>>;

    /// Atomically move a due PENDING or WAITING_RETRY job to IN_PROGRESS
    /// and return the claimed row. `None` means another pass won the claim,
    /// the job is not due yet, or it no longer exists.
    async fn claim_due(&self, job_id: &str, now_millis: i64) -> Result<Option<ProvisionJob>>;

    /// Write the job's full current state, guarded on the stored row still
    /// being IN_PROGRESS. Returns `false` when the guard failed, i.e. this
    /// pass lost its claim and must stop touching the job.
    async fn persist_progress(&self, job: &ProvisionJob) -> Result<bool>;

    /// Move a non-terminal job to CANCELLED. Returns `false` when the job
    /// is missing or already terminal.
    async fn cancel(&self, job_id: &str, now_millis: i64) -> Result<bool>;

    /// Jobs a runner pass could claim right now, oldest first.
    async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<ProvisionJob>>;

    async fn find_by_status(&self, status: JobStatus, limit: i64) -> Result<Vec<ProvisionJob>>;

    /// Most recently touched jobs regardless of status.
    async fn find_recent(&self, limit: i64) -> Result<Vec<ProvisionJob>>;

    /// Return IN_PROGRESS rows untouched since `stale_before_millis` to
    /// PENDING so a later pass can resume them. Returns how many rows moved.
    async fn release_stale(&self, stale_before_millis: i64, now_millis: i64) -> Result<u64>;

    /// Delete terminal rows untouched since `cutoff_millis`.
    async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64>;

    /// Job counts per status, in canonical status order.
    async fn status_counts(&self) -> Result<Vec<(JobStatus, i64)>>;
}

pub mod mocks {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::JobStore;
    use crate::domain::{JobStatus, ProvisionJob};
    use crate::error::{AppError, Result};

    /// Mutex-backed store with the same conditional-write semantics as the
    /// durable implementation.
    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<String, ProvisionJob>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Drop a job in directly, bypassing the insert guards.
        pub fn seed(&self, job: ProvisionJob) {
            self.jobs.lock().unwrap().insert(job.id.clone(), job);
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

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &ProvisionJob) -> Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&job.id) {
                return Err(AppError::Conflict(format!("job {} already exists", job.id)));
            }
            let active = jobs
                .values()
                .any(|j| j.credential_ref == job.credential_ref && j.status.is_active());
            if active {
                return Err(AppError::Conflict(format!(
                    "credential {} already has an active job",
                    job.credential_ref
                )));
            }
            jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, job_id: &str) -> Result<Option<ProvisionJob>> {
            Ok(self.jobs.lock().unwrap().get(job_id).cloned())
        }

        async fn find_active_by_credential(
            &self,
            credential_ref: &str,
        ) -> Result<Option<ProvisionJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .find(|j| j.credential_ref == credential_ref && j.status.is_active())
                .cloned())
        }

        async fn claim_due(&self, job_id: &str, now_millis: i64) -> Result<Option<ProvisionJob>> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(job_id) else {
                return Ok(None);
            };
            if !job.is_due(now_millis) {
                return Ok(None);
            }
            job.claim(now_millis)?;
            Ok(Some(job.clone()))
        }

        async fn persist_progress(&self, job: &ProvisionJob) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get(&job.id) {
                Some(stored) if stored.status == JobStatus::InProgress => {
                    jobs.insert(job.id.clone(), job.clone());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn cancel(&self, job_id: &str, now_millis: i64) -> Result<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(job_id) {
                Some(job) if job.status.is_active() => {
                    job.cancel(now_millis)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<ProvisionJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut due: Vec<ProvisionJob> = jobs
                .values()
                .filter(|j| j.is_due(now_millis))
                .cloned()
                .collect();
            due.sort_by_key(|j| j.created_at);
            due.truncate(limit.max(0) as usize);
            Ok(due)
        }

        async fn find_by_status(
            &self,
            status: JobStatus,
            limit: i64,
        ) -> Result<Vec<ProvisionJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut matching: Vec<ProvisionJob> = jobs
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect();
            matching.sort_by_key(|j| std::cmp::Reverse(j.updated_at));
            matching.truncate(limit.max(0) as usize);
            Ok(matching)
        }

        async fn find_recent(&self, limit: i64) -> Result<Vec<ProvisionJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut all: Vec<ProvisionJob> = jobs.values().cloned().collect();
            all.sort_by_key(|j| std::cmp::Reverse(j.updated_at));
            all.truncate(limit.max(0) as usize);
            Ok(all)
        }

        async fn release_stale(&self, stale_before_millis: i64, now_millis: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut released = 0;
            for job in jobs.values_mut() {
                if job.status == JobStatus::InProgress && job.updated_at < stale_before_millis {
                    job.status = JobStatus::Pending;
                    job.updated_at = now_millis;
                    released += 1;
                }
            }
            Ok(released)
        }

        async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|_, j| !(j.status.is_terminal() && j.updated_at < cutoff_millis));
            Ok((before - jobs.len()) as u64)
        }

        async fn status_counts(&self) -> Result<Vec<(JobStatus, i64)>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(STATUS_ORDER
                .iter()
                .map(|status| {
                    let count = jobs.values().filter(|j| j.status == *status).count() as i64;
                    (*status, count)
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemoryJobStore;
    use super::*;
    use crate::domain::JobParameters;
    use crate::error::AppError;

    fn job(id: &str, credential: &str, now: i64) -> ProvisionJob {
        ProvisionJob::new(
            id.to_string(),
            credential.to_string(),
            vec!["engaged-30d".to_string()],
            JobParameters::default(),
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_second_active_job_for_credential() {
        let store = InMemoryJobStore::new();
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();

        let err = store.insert(&job("j2", "acct-a", 2_000)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A different credential is unaffected.
        store.insert(&job("j3", "acct-b", 3_000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_claim_then_persist_round_trip() {
        let store = InMemoryJobStore::new();
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();

        let mut claimed = store.claim_due("j1", 2_000).await.unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::InProgress);

        claimed.record_created("engaged-30d", 2_500).unwrap();
        assert!(store.persist_progress(&claimed).await.unwrap());

        let stored = store.find_by_id("j1").await.unwrap().unwrap();
        assert_eq!(stored.segments_processed(), 1);
    }

    #[tokio::test]
    async fn test_persist_fails_after_cancellation() {
        let store = InMemoryJobStore::new();
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();
        let claimed = store.claim_due("j1", 2_000).await.unwrap().unwrap();

        assert!(store.cancel("j1", 2_500).await.unwrap());
        assert!(!store.persist_progress(&claimed).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_stale_returns_job_to_pending() {
        let store = InMemoryJobStore::new();
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();
        store.claim_due("j1", 2_000).await.unwrap().unwrap();

        assert_eq!(store.release_stale(2_001, 9_000).await.unwrap(), 1);
        let stored = store.find_by_id("j1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
    }
}
