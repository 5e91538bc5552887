// Segmill ESP Adapter
// HTTP implementation of the EspGateway port. The wire module owns response
// classification so it stays testable without a live endpoint.

mod client;
mod wire;

pub use client::{EspConfig, EspHttpGateway};
