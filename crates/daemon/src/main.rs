//! Segmill Daemon - Main Entry Point
//!
//! Composition root: loads settings, opens the store, wires the ESP
//! adapter and application services together, then runs the JSON-RPC
//! surface and the job runner side by side until Ctrl+C.

mod settings;
mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use segmill_api_rpc::{RpcServer, RpcServerConfig};
use segmill_core::application::{
    CancellationService, JobOrchestrator, JobRunner, MaintenanceConfig, MaintenanceService,
    OrchestratorConfig, RecoveryService, RunnerConfig, ShutdownController, StatusService,
    SubmissionService, TracingObserver,
};
use segmill_core::domain::SegmentCatalog;
use segmill_core::port::id_provider::UuidIdProvider;
use segmill_core::port::time_provider::SystemTimeProvider;
use segmill_infra_esp::{EspConfig, EspHttpGateway};
use segmill_infra_sqlite::{create_pool, run_migrations, SqliteJobStore, SqliteMaintenance};

use crate::settings::{CatalogSettings, LogSettings, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const STALE_RELEASE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (defaults < config file < SEGMILL_* env)
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // 2. Initialize logging (and the OTLP layer when compiled in)
    let _log_guard = init_logging(&settings.log)?;

    #[cfg(not(feature = "telemetry"))]
    if telemetry::endpoint_configured() {
        warn!("OTLP endpoint is set but this build has no telemetry support");
        warn!("Rebuild with: cargo build --features telemetry");
    }

    info!("Segmill v{} starting...", VERSION);

    // 3. Initialize database
    let db_path = settings.database.expanded_path();
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!(db_path = %db_path, "Initializing database...");
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidIdProvider);
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
    let catalog = Arc::new(load_catalog(&settings.catalog)?);

    let mut esp_config = EspConfig::new(&settings.esp.base_url);
    esp_config.api_keys = settings.esp.api_keys.clone();
    esp_config.timeout = Duration::from_secs(settings.esp.timeout_secs);
    esp_config.max_attempts = settings.esp.max_attempts;
    let gateway = Arc::new(EspHttpGateway::new(esp_config)?);

    let submission = Arc::new(SubmissionService::new(
        store.clone(),
        catalog.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));
    let status = Arc::new(StatusService::new(store.clone()));
    let cancellation = Arc::new(CancellationService::new(store.clone(), time_provider.clone()));

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        gateway,
        catalog.clone(),
        Arc::new(TracingObserver),
        time_provider.clone(),
        OrchestratorConfig {
            min_call_interval: Duration::from_millis(settings.runner.min_call_interval_ms),
            ..Default::default()
        },
    ));

    // 5. Run crash recovery
    info!("Running crash recovery...");
    let recovery = RecoveryService::new(store.clone(), time_provider.clone());
    match recovery.recover_interrupted().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        host: settings.rpc.host.clone(),
        port: settings.rpc.port,
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        submission,
        status,
        cancellation,
        maintenance.clone(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 7. Start the job runner
    info!("Starting job runner...");
    let (shutdown_controller, runner_token) = ShutdownController::new();

    let runner = JobRunner::new(
        orchestrator,
        store.clone(),
        time_provider.clone(),
        RunnerConfig {
            poll_interval: Duration::from_millis(settings.runner.poll_interval_ms),
            claim_batch_size: settings.runner.claim_batch_size,
        },
        runner_token,
    );
    let runner_handle = tokio::spawn(runner.run());

    // 8. Start background maintenance
    info!("Starting maintenance timer...");
    let maintenance_service = MaintenanceService::new(
        store.clone(),
        maintenance,
        time_provider.clone(),
        MaintenanceConfig {
            retention: Duration::from_secs(settings.maintenance.retention_days * 24 * 60 * 60),
        },
    );
    let maintenance_interval = Duration::from_secs(settings.maintenance.interval_hours * 60 * 60);
    let mut maintenance_shutdown = shutdown_controller.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(maintenance_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a restart loop does
        // not VACUUM on every boot.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = maintenance_shutdown.triggered() => break,
                _ = ticker.tick() => {
                    if let Err(e) = maintenance_service.run_once().await {
                        error!(error = %e, "Maintenance pass failed");
                    }
                }
            }
        }
    });

    // Periodically hand back claims whose runner died mid-pass. Startup
    // recovery covers full restarts; this covers a runner task that
    // panicked while the daemon kept serving RPC.
    let janitor = RecoveryService::new(store.clone(), time_provider.clone());
    let mut janitor_shutdown = shutdown_controller.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STALE_RELEASE_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = janitor_shutdown.triggered() => break,
                _ = ticker.tick() => {
                    match janitor.release_stale_claims().await {
                        Ok(0) => {}
                        Ok(count) => warn!(released = count, "Released stale job claims"),
                        Err(e) => error!(error = %e, "Stale claim release failed"),
                    }
                }
            }
        }
    });

    info!("✅ System ready. Waiting for segment jobs...");
    info!("Press Ctrl+C to shutdown");

    // 9. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 10. Graceful shutdown
    shutdown_controller.trigger();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    let _ = tokio::time::timeout(Duration::from_secs(5), runner_handle).await;

    info!("Shutdown complete.");

    Ok(())
}

/// Builtin templates, optionally extended from a JSON file. Collisions
/// resolve in favor of the file.
fn load_catalog(catalog: &CatalogSettings) -> Result<SegmentCatalog> {
    let mut templates = SegmentCatalog::builtin();
    if let Some(path) = &catalog.path {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read catalog file {}: {}", path, e))?;
        let extra = SegmentCatalog::from_json(&raw)
            .map_err(|e| anyhow::anyhow!("Failed to parse catalog file {}: {}", path, e))?;
        info!(path = %path, templates = extra.len(), "Loaded catalog extension");
        templates = templates.extended_with(extra);
    }
    Ok(templates)
}

/// Install the global tracing subscriber.
///
/// Returns the appender guard when logging to a file; the caller must
/// keep it alive or buffered lines are lost on exit.
fn init_logging(log: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("segmill=info"))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let (writer, guard) = match &log.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "segmill.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };
    let ansi = guard.is_none();

    #[cfg(feature = "telemetry")]
    if let Some(tracer) = telemetry::build_tracer()? {
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        match log.format.as_str() {
            "json" => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .with(otel_layer)
                .init(),
            _ => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
                .with(otel_layer)
                .init(),
        }
        return Ok(guard);
    }

    match log.format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        _ => {
            // Development: pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
                .init();
        }
    }

    Ok(guard)
}
