use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::backoff::BackoffPolicy;
use crate::application::observer::{ProgressObserver, SegmentOutcome};
use crate::application::pacer::Pacer;
use crate::application::resolver::MetricResolver;
use crate::application::runner::constants::DEFAULT_MIN_CALL_INTERVAL_MS;
use crate::domain::{render_template, ProvisionJob, RateLimitKind, SegmentCatalog};
use crate::error::Result;
use crate::port::{CreateOutcome, EspError, EspGateway, JobStore, TimeProvider};

/// How one pass over a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PassResult {
    /// The job was not claimable: missing, terminal, parked into the
    /// future, or already held by another pass.
    NotClaimed,
    Completed,
    Parked {
        retry_at_millis: i64,
        kind: RateLimitKind,
    },
    Failed {
        reason: String,
    },
    /// The stored row stopped being ours mid-pass, e.g. the job was
    /// cancelled or a stale-claim release handed it to someone else.
    ClaimLost,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Minimum spacing between consecutive create calls in one pass.
    pub min_call_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_call_interval: Duration::from_millis(DEFAULT_MIN_CALL_INTERVAL_MS),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Drives one job at a time: claim it, resolve the account's metrics,
/// then work pending segments in order until the job completes, the ESP
/// parks us, or something job-fatal happens.
///
/// Progress is persisted after every segment outcome, so a crash at any
/// point loses at most the call that was in flight. Every persist is
/// conditional on still holding the claim; a failed persist aborts the
/// pass without touching the ESP again.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    gateway: Arc<dyn EspGateway>,
    resolver: MetricResolver,
    catalog: Arc<SegmentCatalog>,
    observer: Arc<dyn ProgressObserver>,
    time: Arc<dyn TimeProvider>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn EspGateway>,
        catalog: Arc<SegmentCatalog>,
        observer: Arc<dyn ProgressObserver>,
        time: Arc<dyn TimeProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let resolver = MetricResolver::new(gateway.clone());
        Self {
            store,
            gateway,
            resolver,
            catalog,
            observer,
            time,
            config,
        }
    }

    /// Run one pass over `job_id`. Safe to call for jobs in any state; a
    /// fresh job starts from its first segment, a parked or recovered job
    /// resumes exactly where the previous pass stopped.
    pub async fn run_or_resume(&self, job_id: &str) -> Result<PassResult> {
        let now = self.time.now_millis();
        let Some(mut job) = self.store.claim_due(job_id, now).await? else {
            debug!(job_id = %job_id, "Job not claimable, skipping pass");
            return Ok(PassResult::NotClaimed);
        };
        self.observer.on_pass_started(&job);
        debug!(
            job_id = %job.id,
            credential_ref = %job.credential_ref,
            pending = job.ledger.pending().len(),
            "Pass claimed job"
        );

        let metrics = match self.resolver.resolve(&job.credential_ref).await {
            Ok(metrics) => metrics,
            Err(e) => {
                return self
                    .fail_job(job, format!("metric inventory unavailable: {e}"))
                    .await;
            }
        };

        let mut pacer = Pacer::new(self.config.min_call_interval);

        while let Some(segment_id) = job.ledger.next_pending().cloned() {
            let Some(template) = self.catalog.template(&segment_id) else {
                let reason = format!("segment id '{segment_id}' is not in the catalog");
                if let Some(result) = self
                    .record_segment_failure(&mut job, &segment_id, reason)
                    .await?
                {
                    return Ok(result);
                }
                continue;
            };

            let definition = match render_template(template, &metrics, &job.params) {
                Ok(definition) => definition,
                Err(render_error) => {
                    if let Some(result) = self
                        .record_segment_failure(&mut job, &segment_id, render_error.to_string())
                        .await?
                    {
                        return Ok(result);
                    }
                    continue;
                }
            };

            pacer.pace().await;

            match self
                .gateway
                .create_segment(&job.credential_ref, &definition)
                .await
            {
                Ok(CreateOutcome::Created { esp_segment_id }) => {
                    if let Some(result) = self
                        .record_segment_success(
                            &mut job,
                            &segment_id,
                            SegmentOutcome::Created { esp_segment_id },
                        )
                        .await?
                    {
                        return Ok(result);
                    }
                }
                Ok(CreateOutcome::AlreadyExists) => {
                    if let Some(result) = self
                        .record_segment_success(
                            &mut job,
                            &segment_id,
                            SegmentOutcome::AlreadyExisted,
                        )
                        .await?
                    {
                        return Ok(result);
                    }
                }
                Ok(CreateOutcome::HardFailure { reason }) => {
                    if let Some(result) = self
                        .record_segment_failure(&mut job, &segment_id, reason)
                        .await?
                    {
                        return Ok(result);
                    }
                }
                Ok(CreateOutcome::RateLimited(signal)) => {
                    let now = self.time.now_millis();
                    let kind = self.config.backoff.classify(&signal);
                    let retry_at = self.config.backoff.retry_at_millis(kind, &signal, now);
                    job.park(retry_at, kind, now)?;
                    if !self.store.persist_progress(&job).await? {
                        return Ok(self.claim_lost(&job));
                    }
                    self.observer.on_job_parked(&job);
                    warn!(
                        job_id = %job.id,
                        segment_id = %segment_id,
                        kind = %kind,
                        retry_at_millis = retry_at,
                        detail = ?signal.detail,
                        "ESP rate limited, job parked"
                    );
                    return Ok(PassResult::Parked {
                        retry_at_millis: retry_at,
                        kind,
                    });
                }
                Err(EspError::InvalidCredential(detail)) => {
                    return self
                        .fail_job(job, format!("credential rejected by ESP: {detail}"))
                        .await;
                }
                Err(e) => {
                    return self
                        .fail_job(job, format!("segment create call failed: {e}"))
                        .await;
                }
            }
        }

        let now = self.time.now_millis();
        job.complete(now)?;
        if !self.store.persist_progress(&job).await? {
            return Ok(self.claim_lost(&job));
        }
        self.observer.on_job_finished(&job);
        debug!(
            job_id = %job.id,
            created = job.ledger.completed().len(),
            failed = job.ledger.failed().len(),
            "Pass completed job"
        );
        Ok(PassResult::Completed)
    }

    /// Record a created-or-existing segment and persist. `Some` means the
    /// pass must end with that result.
    async fn record_segment_success(
        &self,
        job: &mut ProvisionJob,
        segment_id: &str,
        outcome: SegmentOutcome,
    ) -> Result<Option<PassResult>> {
        let now = self.time.now_millis();
        job.record_created(segment_id, now)?;
        self.observer.on_segment_outcome(job, segment_id, &outcome);
        if !self.store.persist_progress(job).await? {
            return Ok(Some(self.claim_lost(job)));
        }
        Ok(None)
    }

    async fn record_segment_failure(
        &self,
        job: &mut ProvisionJob,
        segment_id: &str,
        reason: String,
    ) -> Result<Option<PassResult>> {
        let now = self.time.now_millis();
        job.record_failed_segment(segment_id, reason.clone(), now)?;
        self.observer
            .on_segment_outcome(job, segment_id, &SegmentOutcome::Failed { reason });
        if !self.store.persist_progress(job).await? {
            return Ok(Some(self.claim_lost(job)));
        }
        Ok(None)
    }

    async fn fail_job(&self, mut job: ProvisionJob, reason: String) -> Result<PassResult> {
        let now = self.time.now_millis();
        job.fail(reason.clone(), now)?;
        if !self.store.persist_progress(&job).await? {
            return Ok(self.claim_lost(&job));
        }
        self.observer.on_job_finished(&job);
        warn!(job_id = %job.id, reason = %reason, "Job failed");
        Ok(PassResult::Failed { reason })
    }

    fn claim_lost(&self, job: &ProvisionJob) -> PassResult {
        warn!(job_id = %job.id, "Claim lost mid-pass, abandoning");
        PassResult::ClaimLost
    }
}
