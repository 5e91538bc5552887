// Port Layer - Interfaces to infrastructure (hexagonal architecture)

pub mod esp_gateway;
pub mod id_provider;
pub mod job_store;
pub mod maintenance;
pub mod time_provider;

// Re-exports
pub use esp_gateway::{
    CreateOutcome, EspError, EspGateway, MetricEntry, MetricPage, ThrottleSignal,
};
pub use id_provider::{IdProvider, UuidIdProvider};
pub use job_store::JobStore;
pub use maintenance::MaintenancePort;
pub use time_provider::{SystemTimeProvider, TimeProvider};
