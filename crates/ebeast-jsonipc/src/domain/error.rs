//! Jsonipc error types.
//!
//! Reply errors carry the JSON-RPC style codes the sound engine's dispatcher
//! emits; everything the client itself can fail at is a [`ClientError`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::config::ConfigError;

/// Error codes produced by the engine's Jsonipc dispatcher
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Exceptions raised by engine code, turned into replies by its exception handler
    pub const APPLICATION_ERROR: i32 = -32500;

    // Any other closure failure
    pub const SERVER_ERROR: i32 = -32000;
}

/// Error object of a reply frame: `{"code": ..., "message": ..., "data"?: ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Jsonipc error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Create a new reply error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The dispatcher's reply for a method it has no closure for
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: unknown '{}'", method),
        )
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }

    /// Human readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self.code {
            codes::PARSE_ERROR => "parse error",
            codes::INVALID_REQUEST => "invalid request",
            codes::METHOD_NOT_FOUND => "method not found",
            codes::INVALID_PARAMS => "invalid params",
            codes::INTERNAL_ERROR => "internal error",
            codes::APPLICATION_ERROR => "application error",
            _ => "server error",
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl Serialize for RpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("RpcError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for RpcError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            #[serde(default)]
            code: i32,
            #[serde(default)]
            message: String,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(RpcError {
            code: helper.code,
            message: helper.message,
            data: helper.data,
        })
    }
}

/// Client-side errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `open()` while another connection is live; a caller bug
    #[error("a Jsonipc connection is already open")]
    AlreadyOpen,

    /// Socket could not be established or failed before the handshake completed
    #[error("connection error: {0}")]
    Connect(String),

    /// The handshake call was rejected by the engine
    #[error("handshake rejected: {0}")]
    Handshake(RpcError),

    /// The connection is closed, or closed while the request was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// The engine replied with an error for this call
    #[error("remote error: {0}")]
    Rpc(#[from] RpcError),

    /// A request could not be serialized
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The reply did not have the shape a typed helper expects
    #[error("unexpected result for {method}: {value}")]
    UnexpectedResult {
        method: String,
        value: serde_json::Value,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Proxy class registration failed
    #[error("proxy registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ClientError {
    pub(crate) fn unexpected(method: &str, value: serde_json::Value) -> Self {
        Self::UnexpectedResult {
            method: method.to_string(),
            value,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connect(e.to_string())
    }
}

/// Proxy class registration failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("proxy class name must not be empty")]
    EmptyClass,

    #[error("proxy class {class} already registered by {registered_by}")]
    Duplicate {
        class: String,
        registered_by: &'static str,
    },
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
