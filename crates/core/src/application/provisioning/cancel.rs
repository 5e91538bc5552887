use std::sync::Arc;

use tracing::info;

use crate::domain::ProvisionJob;
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};

/// Operator-requested cancellation. Cancelling never deletes anything in
/// the ESP; segments that were already created stay created.
pub struct CancellationService {
    store: Arc<dyn JobStore>,
    time: Arc<dyn TimeProvider>,
}

impl CancellationService {
    pub fn new(store: Arc<dyn JobStore>, time: Arc<dyn TimeProvider>) -> Self {
        Self { store, time }
    }

    pub async fn cancel(&self, job_id: &str) -> Result<ProvisionJob> {
        let job = self
            .store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
        if job.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "job {job_id} is already {}",
                job.status
            )));
        }

        let now = self.time.now_millis();
        if !self.store.cancel(job_id, now).await? {
            // Lost a race against completion or another cancel.
            let current = self
                .store
                .find_by_id(job_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
            return Err(AppError::InvalidState(format!(
                "job {job_id} is already {}",
                current.status
            )));
        }

        info!(job_id = %job_id, "Job cancelled");
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("job {job_id} vanished after cancel")))
    }
}
