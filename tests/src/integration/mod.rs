//! Cross-module flows over a real WebSocket.

pub mod rpc_flows;
pub mod session_flows;
