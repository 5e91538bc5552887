//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for the Segmill daemon. Binds to
//! localhost only; mutating methods sit behind a token-bucket limiter.

pub mod error;
pub mod handler;
mod rate_limiter;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
