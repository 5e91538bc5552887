use std::sync::Arc;

use crate::domain::{JobStatus, ProvisionJob};
use crate::error::{AppError, Result};
use crate::port::JobStore;

/// Read-side queries over the job store.
pub struct StatusService {
    store: Arc<dyn JobStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn job(&self, job_id: &str) -> Result<ProvisionJob> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ProvisionJob>> {
        self.store.find_recent(limit).await
    }

    pub async fn by_status(&self, status: JobStatus, limit: i64) -> Result<Vec<ProvisionJob>> {
        self.store.find_by_status(status, limit).await
    }

    pub async fn status_counts(&self) -> Result<Vec<(JobStatus, i64)>> {
        self.store.status_counts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobParameters;
    use crate::port::job_store::mocks::InMemoryJobStore;

    fn job(id: &str, credential: &str, created_at: i64) -> ProvisionJob {
        ProvisionJob::new(
            id.to_string(),
            credential.to_string(),
            vec!["engaged-30d".to_string()],
            JobParameters::default(),
            created_at,
        )
    }

    #[tokio::test]
    async fn test_job_lookup_reports_not_found() {
        let service = StatusService::new(Arc::new(InMemoryJobStore::new()));
        let err = service.job("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recent_orders_by_last_touch() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();
        store.insert(&job("j2", "acct-b", 2_000)).await.unwrap();
        store.insert(&job("j3", "acct-c", 3_000)).await.unwrap();

        let service = StatusService::new(store);
        let recent = service.recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j3", "j2"]);
    }

    #[tokio::test]
    async fn test_counts_cover_every_status() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert(&job("j1", "acct-a", 1_000)).await.unwrap();

        let service = StatusService::new(store);
        let counts = service.status_counts().await.unwrap();
        assert_eq!(counts.len(), 6);
        assert_eq!(counts[0], (JobStatus::Pending, 1));
    }
}
