//! Wire frames.
//!
//! Text frames are JSON objects:
//!
//! ```text
//! client -> engine   {"id": n, "method": "...", "params": [...]}
//! engine -> client   {"id": n, "result": ...} | {"id": n, "error": {code, message}}
//! engine -> client   {"method": "...", "params": [...]}          (notification)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::RpcError;
use crate::domain::ids::RequestId;

/// Outgoing call
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: RequestId,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl<'a> Request<'a> {
    pub fn new(id: RequestId, method: &'a str, params: &'a [Value]) -> Self {
        Self { id, method, params }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Every field any incoming frame may carry
#[derive(Debug, Default, Deserialize)]
struct RawFrame {
    id: Option<u64>,
    method: Option<String>,
    params: Option<Vec<Value>>,
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

/// Classified incoming text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply to an earlier request
    Reply {
        id: RequestId,
        outcome: Result<Value, RpcError>,
    },
    /// Unsolicited server push
    Notification { method: String, params: Vec<Value> },
    /// Anything else; logged and dropped
    Unhandled(Value),
}

/// Why a text frame could not be classified at all
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Frame {
    /// Parse and classify one text frame.
    ///
    /// A frame with a non-null numeric `id` is a reply; without `id` but
    /// with `method` and array `params` it is a notification.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    pub fn classify(value: Value) -> Self {
        if !value.is_object() {
            return Frame::Unhandled(value);
        }
        let raw = match RawFrame::deserialize(&value) {
            Ok(raw) => raw,
            Err(_) => return Frame::Unhandled(value),
        };

        match raw {
            RawFrame {
                id: Some(id),
                error: Some(error),
                ..
            } => Frame::Reply {
                id: RequestId::new(id),
                outcome: Err(error),
            },
            RawFrame {
                id: Some(id),
                result,
                ..
            } => Frame::Reply {
                id: RequestId::new(id),
                outcome: Ok(result),
            },
            RawFrame {
                id: None,
                method: Some(method),
                params: Some(params),
                ..
            } => Frame::Notification { method, params },
            _ => Frame::Unhandled(value),
        }
    }
}
