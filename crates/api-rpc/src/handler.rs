//! RPC Method Handlers
//!
//! Implements each JSON-RPC method over the application services.

use std::sync::Arc;
use std::time::Instant;

use jsonrpsee::types::ErrorObjectOwned;
use segmill_core::application::{
    CancellationService, StatusService, SubmissionRequest, SubmissionService,
};
use segmill_core::domain::{JobParameters, JobStatus};
use segmill_core::port::MaintenancePort;

use crate::error::{throttled_error, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelRequest, CancelResponse, JobReport, ListRequest, ListResponse, StatsRequest,
    StatsResponse, StatusRequest, SubmitRequest, SubmitResponse,
};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    submission: Arc<SubmissionService>,
    status: Arc<StatusService>,
    cancellation: Arc<CancellationService>,
    maintenance: Arc<dyn MaintenancePort>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        submission: Arc<SubmissionService>,
        status: Arc<StatusService>,
        cancellation: Arc<CancellationService>,
        maintenance: Arc<dyn MaintenancePort>,
    ) -> Self {
        // Default: 200 burst, 100 req/sec (configurable via env)
        let max_burst: u32 = std::env::var("SEGMILL_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("SEGMILL_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            submission,
            status,
            cancellation,
            maintenance,
            rate_limiter: RateLimiter::new(max_burst, rate_per_sec),
            start_time: Instant::now(),
        }
    }

    /// segments.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled_error());
        }

        let mut job_params = JobParameters::default();
        if let Some(currency) = params.currency_symbol {
            job_params.currency_symbol = currency;
        }
        if let Some(thresholds) = params.thresholds {
            job_params.thresholds = thresholds;
        }

        let job = self
            .submission
            .submit(SubmissionRequest {
                credential_ref: params.credential_ref,
                segment_ids: params.segment_ids,
                params: job_params,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id: job.id.clone(),
            status: job.status.to_string(),
            total_segments: job.total_segments(),
        })
    }

    /// segments.status.v1
    pub async fn status(&self, params: StatusRequest) -> Result<JobReport, ErrorObjectOwned> {
        let job = self
            .status
            .job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(JobReport::from(&job))
    }

    /// segments.cancel.v1
    pub async fn cancel(&self, params: CancelRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled_error());
        }

        let job = self
            .cancellation
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: job.id.clone(),
            cancelled: job.status == JobStatus::Cancelled,
            status: job.status.to_string(),
        })
    }

    /// segments.list.v1
    pub async fn list(&self, params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        let limit = params.limit.clamp(1, 500);
        let jobs = match params.status {
            Some(status) => self.status.by_status(status, limit).await,
            None => self.status.recent(limit).await,
        }
        .map_err(to_rpc_error)?;

        Ok(ListResponse {
            jobs: jobs.iter().map(JobReport::from).collect(),
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let counts = self.status.status_counts().await.map_err(to_rpc_error)?;
        let db_size_bytes = self
            .maintenance
            .storage_size_bytes()
            .await
            .map_err(to_rpc_error)?;

        let mut response = StatsResponse {
            total_jobs: 0,
            pending_jobs: 0,
            in_progress_jobs: 0,
            waiting_retry_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
            db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        };
        for (status, count) in counts {
            response.total_jobs += count;
            match status {
                JobStatus::Pending => response.pending_jobs = count,
                JobStatus::InProgress => response.in_progress_jobs = count,
                JobStatus::WaitingRetry => response.waiting_retry_jobs = count,
                JobStatus::Completed => response.completed_jobs = count,
                JobStatus::Failed => response.failed_jobs = count,
                JobStatus::Cancelled => response.cancelled_jobs = count,
            }
        }

        Ok(response)
    }
}
