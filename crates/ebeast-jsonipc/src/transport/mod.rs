//! WebSocket transport: the connection, its request store and the
//! single-connection slot.

pub mod connection;
pub mod connector;
pub mod pending;

pub use connection::{BinaryHandler, Connection};
pub use connector::Connector;
pub use pending::{PendingRequestStore, PendingStats};
