// Domain Layer - Pure business logic and entities

pub mod catalog;
pub mod error;
pub mod job;
pub mod ledger;
pub mod metrics;

// Re-exports
pub use catalog::{
    render_template, Amount, Comparator, ConditionTree, Fallback, Measurement, MetricRef,
    RenderError, SegmentCatalog, SegmentDefinition, SegmentId, SegmentTemplate,
};
pub use error::DomainError;
pub use job::{CredentialRef, JobId, JobParameters, JobStatus, ProvisionJob, RateLimitKind};
pub use ledger::SegmentLedger;
pub use metrics::MetricLookup;
