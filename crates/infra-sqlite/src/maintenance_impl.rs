// SQLite Maintenance Implementation

use async_trait::async_trait;
use segmill_core::error::{AppError, Result};
use segmill_core::port::MaintenancePort;
use sqlx::SqlitePool;
use tracing::info;

pub struct SqliteMaintenance {
    pool: SqlitePool,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get DB size in MB
    async fn get_db_size(&self) -> Result<f64> {
        Ok(self.get_db_size_bytes().await? as f64 / (1024.0 * 1024.0))
    }

    async fn get_db_size_bytes(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }
}

#[async_trait]
impl MaintenancePort for SqliteMaintenance {
    async fn optimize_storage(&self) -> Result<()> {
        let size_before = self.get_db_size().await?;

        // Fold the WAL back into the main file before compacting.
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("WAL checkpoint failed: {}", e)))?;

        sqlx::query("PRAGMA optimize")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("PRAGMA optimize failed: {}", e)))?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        let size_after = self.get_db_size().await?;
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "Storage optimization completed"
        );

        Ok(())
    }

    async fn storage_size_bytes(&self) -> Result<i64> {
        self.get_db_size_bytes().await
    }
}
