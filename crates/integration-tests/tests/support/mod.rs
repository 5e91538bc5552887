#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use segmill_core::application::{JobOrchestrator, NullObserver, OrchestratorConfig};
use segmill_core::domain::SegmentCatalog;
use segmill_core::port::esp_gateway::mocks::ScriptedEspGateway;
use segmill_core::port::time_provider::mocks::FixedTimeProvider;
use segmill_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};

/// 2023-11-14T22:13:20Z.
pub const NOW: i64 = 1_700_000_000_000;

/// Fresh in-memory store with the real schema applied.
pub async fn sqlite_store() -> Arc<SqliteJobStore> {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteJobStore::new(pool))
}

/// Gateway stocked with every metric the builtin catalog references.
pub fn full_metric_gateway() -> Arc<ScriptedEspGateway> {
    Arc::new(ScriptedEspGateway::with_metrics(vec![
        ("Opened Email", "MET-1"),
        ("Placed Order", "MET-2"),
        ("Active on Site", "MET-3"),
        ("Started Checkout", "MET-4"),
    ]))
}

/// Orchestrator with pacing disabled so passes run at test speed.
pub fn orchestrator(
    store: Arc<SqliteJobStore>,
    gateway: Arc<ScriptedEspGateway>,
    clock: Arc<FixedTimeProvider>,
) -> JobOrchestrator {
    JobOrchestrator::new(
        store,
        gateway,
        Arc::new(SegmentCatalog::builtin()),
        Arc::new(NullObserver),
        clock,
        OrchestratorConfig {
            min_call_interval: Duration::ZERO,
            ..OrchestratorConfig::default()
        },
    )
}
