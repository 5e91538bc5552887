use std::sync::Arc;

use tracing::{info, warn};

use crate::application::runner::constants::STALE_CLAIM_WINDOW_MS;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};

/// Returns orphaned IN_PROGRESS claims to PENDING so their jobs resume
/// from the ledger instead of staying stuck forever.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    time: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>, time: Arc<dyn TimeProvider>) -> Self {
        Self { store, time }
    }

    /// Startup recovery. No pass can be running yet, so every IN_PROGRESS
    /// row is a claim the previous process died holding.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let now = self.time.now_millis();
        let released = self.store.release_stale(now + 1, now).await?;
        if released > 0 {
            info!(released, "Recovered interrupted jobs from previous run");
        }
        Ok(released)
    }

    /// Periodic safety net: release claims whose holder stopped persisting
    /// progress a while ago. A healthy pass touches its row far more often
    /// than the stale window.
    pub async fn release_stale_claims(&self) -> Result<u64> {
        let now = self.time.now_millis();
        let released = self
            .store
            .release_stale(now - STALE_CLAIM_WINDOW_MS, now)
            .await?;
        if released > 0 {
            warn!(released, "Released stale job claims");
        }
        Ok(released)
    }
}
