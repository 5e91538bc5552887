use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::port::{JobStore, MaintenancePort, TimeProvider};

const DEFAULT_RETENTION_DAYS: u64 = 30;

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How long terminal jobs stay queryable before purging.
    pub retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub purged_jobs: u64,
}

/// Periodic store upkeep: purge old terminal jobs, then let the storage
/// backend compact itself.
pub struct MaintenanceService {
    store: Arc<dyn JobStore>,
    maintenance: Arc<dyn MaintenancePort>,
    time: Arc<dyn TimeProvider>,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<dyn JobStore>,
        maintenance: Arc<dyn MaintenancePort>,
        time: Arc<dyn TimeProvider>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            store,
            maintenance,
            time,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<MaintenanceReport> {
        let now = self.time.now_millis();
        let cutoff = now - self.config.retention.as_millis() as i64;
        let purged_jobs = self.store.purge_terminal_older_than(cutoff).await?;
        self.maintenance.optimize_storage().await?;
        info!(purged_jobs, "Maintenance pass finished");
        Ok(MaintenanceReport { purged_jobs })
    }
}
