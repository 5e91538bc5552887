// Provisioning Use Cases - submit, inspect, cancel

pub mod cancel;
pub mod status;
pub mod submit;

pub use cancel::CancellationService;
pub use status::StatusService;
pub use submit::{SubmissionRequest, SubmissionService};
