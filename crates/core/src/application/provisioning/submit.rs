use std::sync::Arc;

use tracing::info;

use crate::domain::{JobParameters, ProvisionJob, SegmentCatalog};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};

/// Most segment ids accepted in one job.
const MAX_SEGMENTS_PER_JOB: usize = 100;

#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub credential_ref: String,
    pub segment_ids: Vec<String>,
    pub params: JobParameters,
}

/// Accepts new provisioning jobs. Validation happens here, before anything
/// touches the store; the store's uniqueness guard is the final authority
/// on the one-active-job-per-credential rule.
pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    catalog: Arc<SegmentCatalog>,
    ids: Arc<dyn IdProvider>,
    time: Arc<dyn TimeProvider>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<SegmentCatalog>,
        ids: Arc<dyn IdProvider>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            catalog,
            ids,
            time,
        }
    }

    pub async fn submit(&self, request: SubmissionRequest) -> Result<ProvisionJob> {
        let credential_ref = request.credential_ref.trim();
        if credential_ref.is_empty() {
            return Err(AppError::Validation(
                "credential_ref must not be empty".to_string(),
            ));
        }
        if request.segment_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one segment id is required".to_string(),
            ));
        }
        if request.segment_ids.len() > MAX_SEGMENTS_PER_JOB {
            return Err(AppError::Validation(format!(
                "at most {MAX_SEGMENTS_PER_JOB} segment ids per job, got {}",
                request.segment_ids.len()
            )));
        }
        let unknown: Vec<String> = request
            .segment_ids
            .iter()
            .filter(|id| !self.catalog.contains(id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::Validation(format!(
                "unknown segment ids: {}",
                unknown.join(", ")
            )));
        }

        if let Some(existing) = self.store.find_active_by_credential(credential_ref).await? {
            return Err(AppError::Conflict(format!(
                "credential {credential_ref} already has active job {} ({})",
                existing.id, existing.status
            )));
        }

        let now = self.time.now_millis();
        let job = ProvisionJob::new(
            self.ids.new_job_id(),
            credential_ref.to_string(),
            request.segment_ids,
            request.params,
            now,
        );
        self.store.insert(&job).await?;
        info!(
            job_id = %job.id,
            credential_ref = %job.credential_ref,
            segments = job.total_segments(),
            "Job submitted"
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::port::id_provider::mocks::SequenceIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn service() -> (SubmissionService, Arc<InMemoryJobStore>) {
        let store = Arc::new(InMemoryJobStore::new());
        let service = SubmissionService::new(
            store.clone(),
            Arc::new(SegmentCatalog::builtin()),
            Arc::new(SequenceIdProvider::default()),
            Arc::new(FixedTimeProvider::at(1_000)),
        );
        (service, store)
    }

    fn request(credential: &str, segment_ids: &[&str]) -> SubmissionRequest {
        SubmissionRequest {
            credential_ref: credential.to_string(),
            segment_ids: segment_ids.iter().map(|s| s.to_string()).collect(),
            params: JobParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let (service, store) = service();

        let job = service
            .submit(request("acct-a", &["engaged-30d", "repeat-buyers"]))
            .await
            .unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_segments(), 2);
        assert!(store.find_by_id("job-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_collapses_duplicate_ids() {
        let (service, _store) = service();

        let job = service
            .submit(request("acct-a", &["engaged-30d", "engaged-30d", "repeat-buyers"]))
            .await
            .unwrap();

        assert_eq!(job.total_segments(), 2);
        assert_eq!(job.ledger.pending(), &["engaged-30d", "repeat-buyers"]);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_and_unknown_input() {
        let (service, _store) = service();

        let err = service.submit(request("", &["engaged-30d"])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service.submit(request("acct-a", &[])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .submit(request("acct-a", &["engaged-30d", "bogus-1", "bogus-2"]))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => {
                assert!(message.contains("bogus-1"));
                assert!(message.contains("bogus-2"));
                assert!(!message.contains("engaged-30d"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_second_active_job_for_credential() {
        let (service, _store) = service();
        let first = service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();

        let err = service
            .submit(request("acct-a", &["repeat-buyers"]))
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(message) => assert!(message.contains(&first.id)),
            other => panic!("unexpected error: {other:?}"),
        }

        // Other credentials are unaffected.
        service.submit(request("acct-b", &["repeat-buyers"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_allowed_after_previous_job_finishes() {
        let (service, store) = service();
        service.submit(request("acct-a", &["engaged-30d"])).await.unwrap();

        let mut job = store.claim_due("job-1", 2_000).await.unwrap().unwrap();
        job.record_created("engaged-30d", 2_100).unwrap();
        job.complete(2_200).unwrap();
        assert!(store.persist_progress(&job).await.unwrap());

        let second = service.submit(request("acct-a", &["repeat-buyers"])).await.unwrap();
        assert_eq!(second.id, "job-2");
    }
}
