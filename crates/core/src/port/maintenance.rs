use async_trait::async_trait;

use crate::error::Result;

/// Storage upkeep hooks, driven by the daemon's maintenance timer.
#[async_trait]
pub trait MaintenancePort: Send + Sync {
    /// Compact the store and refresh planner statistics.
    async fn optimize_storage(&self) -> Result<()>;

    /// Current on-disk size of the store.
    async fn storage_size_bytes(&self) -> Result<i64>;
}
