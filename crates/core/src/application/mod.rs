// Application Layer - Use cases and long-running loops

pub mod backoff;
pub mod maintenance;
pub mod observer;
pub mod orchestrator;
pub mod pacer;
pub mod provisioning;
pub mod recovery;
pub mod resolver;
pub mod runner;

// Re-exports
pub use backoff::BackoffPolicy;
pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceService};
pub use observer::{NullObserver, ProgressObserver, SegmentOutcome, TracingObserver};
pub use orchestrator::{JobOrchestrator, OrchestratorConfig, PassResult};
pub use pacer::Pacer;
pub use provisioning::{CancellationService, StatusService, SubmissionRequest, SubmissionService};
pub use recovery::RecoveryService;
pub use resolver::MetricResolver;
pub use runner::{JobRunner, RunnerConfig, ShutdownController, ShutdownToken};
