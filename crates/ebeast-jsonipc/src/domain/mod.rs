//! Domain types for the Jsonipc client.
//!
//! Configuration, errors, request ids, wire frames and remote references.
//! Async infrastructure (pending requests, the socket) lives in `transport`.

pub mod config;
pub mod error;
pub mod ids;
pub mod remote;
pub mod wire;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult, RegistryError, RpcError};
pub use ids::{RequestId, RequestIdGenerator};
pub use remote::{marshal, marshal_params, RemoteRef};
pub use wire::{Frame, Request};
