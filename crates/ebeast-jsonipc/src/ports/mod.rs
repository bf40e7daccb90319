//! Ports (hexagonal architecture).
//!
//! The SHM broadcaster and the frame scheduler reach the engine only through
//! these traits, so both can be driven by mocks in tests.

pub mod outbound;

pub use outbound::EngineGateway;
