use tracing::{info, warn};

use crate::domain::{JobStatus, ProvisionJob};

/// Final per-segment result, as reported to observers and recorded in the
/// job ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    Created { esp_segment_id: String },
    /// The ESP already had this segment; counts as success.
    AlreadyExisted,
    Failed { reason: String },
}

/// Hook points for progress reporting. Callbacks run on the pass's task and
/// must return quickly; implementations that need to do real work should
/// hand off to their own channel.
pub trait ProgressObserver: Send + Sync {
    fn on_pass_started(&self, _job: &ProvisionJob) {}

    fn on_segment_outcome(&self, _job: &ProvisionJob, _segment_id: &str, _outcome: &SegmentOutcome) {
    }

    fn on_job_parked(&self, _job: &ProvisionJob) {}

    /// Job reached a terminal status (completed, failed or cancelled).
    fn on_job_finished(&self, _job: &ProvisionJob) {}
}

/// Observer that does nothing. Useful default for embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// Observer that mirrors progress into the log stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_pass_started(&self, job: &ProvisionJob) {
        info!(
            job_id = %job.id,
            credential_ref = %job.credential_ref,
            pending = job.ledger.pending().len(),
            processed = job.segments_processed(),
            "Pass started"
        );
    }

    fn on_segment_outcome(&self, job: &ProvisionJob, segment_id: &str, outcome: &SegmentOutcome) {
        match outcome {
            SegmentOutcome::Created { esp_segment_id } => info!(
                job_id = %job.id,
                segment_id = %segment_id,
                esp_segment_id = %esp_segment_id,
                "Segment created"
            ),
            SegmentOutcome::AlreadyExisted => info!(
                job_id = %job.id,
                segment_id = %segment_id,
                "Segment already existed"
            ),
            SegmentOutcome::Failed { reason } => warn!(
                job_id = %job.id,
                segment_id = %segment_id,
                reason = %reason,
                "Segment failed"
            ),
        }
    }

    fn on_job_parked(&self, job: &ProvisionJob) {
        warn!(
            job_id = %job.id,
            retry_at = ?job.retry_at,
            rate_limit_kind = ?job.rate_limit_kind,
            "Job parked by rate limit"
        );
    }

    fn on_job_finished(&self, job: &ProvisionJob) {
        let completed = job.ledger.completed().len();
        let failed = job.ledger.failed().len();
        match job.status {
            JobStatus::Completed => info!(
                job_id = %job.id,
                completed,
                failed,
                "Job completed"
            ),
            JobStatus::Failed => warn!(
                job_id = %job.id,
                completed,
                failed,
                reason = job.failure_reason.as_deref().unwrap_or("unknown"),
                "Job failed"
            ),
            _ => info!(job_id = %job.id, status = %job.status, "Job finished"),
        }
    }
}

pub mod mocks {
    use std::sync::Mutex;

    use super::{ProgressObserver, SegmentOutcome};
    use crate::domain::ProvisionJob;

    /// Recorded observer event, newest last.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ObservedEvent {
        PassStarted { job_id: String },
        Segment { job_id: String, segment_id: String, outcome: SegmentOutcome },
        Parked { job_id: String, retry_at: Option<i64> },
        Finished { job_id: String, status: String },
    }

    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ObservedEvent>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ObservedEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressObserver for RecordingObserver {
        fn on_pass_started(&self, job: &ProvisionJob) {
            self.events.lock().unwrap().push(ObservedEvent::PassStarted {
                job_id: job.id.clone(),
            });
        }

        fn on_segment_outcome(
            &self,
            job: &ProvisionJob,
            segment_id: &str,
            outcome: &SegmentOutcome,
        ) {
            self.events.lock().unwrap().push(ObservedEvent::Segment {
                job_id: job.id.clone(),
                segment_id: segment_id.to_string(),
                outcome: outcome.clone(),
            });
        }

        fn on_job_parked(&self, job: &ProvisionJob) {
            self.events.lock().unwrap().push(ObservedEvent::Parked {
                job_id: job.id.clone(),
                retry_at: job.retry_at,
            });
        }

        fn on_job_finished(&self, job: &ProvisionJob) {
            self.events.lock().unwrap().push(ObservedEvent::Finished {
                job_id: job.id.clone(),
                status: job.status.to_string(),
            });
        }
    }
}
