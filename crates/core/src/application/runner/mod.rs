// Job Runner - background loop that drives due jobs through the orchestrator

pub mod constants;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::application::orchestrator::{JobOrchestrator, PassResult};
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};
use constants::{DEFAULT_CLAIM_BATCH_SIZE, DEFAULT_POLL_INTERVAL_MS};
pub use shutdown::{ShutdownController, ShutdownToken};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub claim_batch_size: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            claim_batch_size: DEFAULT_CLAIM_BATCH_SIZE,
        }
    }
}

/// Polls for due jobs and runs them one at a time. Sequential on purpose:
/// every pass talks to the same rate-limited ESP, so parallel passes would
/// just trip the limits faster.
pub struct JobRunner {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<dyn JobStore>,
    time: Arc<dyn TimeProvider>,
    config: RunnerConfig,
    shutdown: ShutdownToken,
}

impl JobRunner {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        store: Arc<dyn JobStore>,
        time: Arc<dyn TimeProvider>,
        config: RunnerConfig,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            orchestrator,
            store,
            time,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job runner started"
        );
        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            match self.process_due_jobs().await {
                Ok(processed) if processed > 0 => continue,
                Ok(_) => {}
                Err(e) => error!(error = %e, "Runner iteration failed"),
            }
            tokio::select! {
                _ = self.shutdown.triggered() => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }
        info!("Job runner stopped");
    }

    /// Run one pass per due job. Returns how many passes did real work.
    async fn process_due_jobs(&self) -> Result<usize> {
        let now = self.time.now_millis();
        let due = self
            .store
            .find_due(now, self.config.claim_batch_size)
            .await?;
        let mut processed = 0;
        for job in due {
            if self.shutdown.is_triggered() {
                break;
            }
            match self.orchestrator.run_or_resume(&job.id).await {
                Ok(PassResult::NotClaimed) => {}
                Ok(_) => processed += 1,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Pass failed with internal error");
                }
            }
        }
        Ok(processed)
    }
}
