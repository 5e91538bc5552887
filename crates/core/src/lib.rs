// Segmill Core - Domain Logic & Ports
// NO infrastructure dependencies (hexagonal architecture)
//
// The engine materializes audience segments inside an external email service
// provider (ESP) whose segment-creation endpoint is heavily rate limited.
// Everything here is invocation-driven: a pass claims a job, works until it
// completes, hits a rate limit, or loses its claim, and leaves all state in
// the durable job row.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
