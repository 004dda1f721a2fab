//! JSON-RPC 2.0 message classification and NDJSON line parsing.
//!
//! The guard never needs a full JSON-RPC implementation: it classifies each
//! line by the presence of `id` and `method`, extracts `params` for the
//! governance checks, and otherwise treats the line as opaque bytes to be
//! forwarded. Classification failures are not errors at the pipeline level —
//! an unclassifiable line is forwarded raw (fail-open).

use serde::Serialize;
use thiserror::Error;

/// A JSON-RPC 2.0 request/response identifier.
///
/// Strings, integers, and null are valid; floats, booleans, arrays, and
/// objects are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
    /// Explicit null id.
    Null,
}

impl JsonRpcId {
    /// Correlation key for matching a response to a logged request.
    ///
    /// Numbers and strings that render identically share a key, mirroring the
    /// loose id comparison of upstream MCP clients.
    pub fn key(&self) -> String {
        match self {
            JsonRpcId::Number(n) => n.to_string(),
            JsonRpcId::String(s) => s.clone(),
            JsonRpcId::Null => "null".to_string(),
        }
    }
}

/// Classified JSON-RPC 2.0 message kind.
///
/// - Request: has both `id` and `method`
/// - Response: has `id` but no `method`
/// - Notification: has `method` but no `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Expects a correlated response.
    Request { id: JsonRpcId, method: String },
    /// Answers a previous request.
    Response { id: JsonRpcId },
    /// Fire-and-forget.
    Notification { method: String },
}

impl MessageKind {
    /// The method name, or `None` for responses.
    pub fn method(&self) -> Option<&str> {
        match self {
            MessageKind::Request { method, .. } | MessageKind::Notification { method } => {
                Some(method)
            }
            MessageKind::Response { .. } => None,
        }
    }

    /// The id, or `None` for notifications.
    pub fn id(&self) -> Option<&JsonRpcId> {
        match self {
            MessageKind::Request { id, .. } | MessageKind::Response { id } => Some(id),
            MessageKind::Notification { .. } => None,
        }
    }
}

/// Errors that can occur during message classification.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The line is not a JSON object (not valid JSON, or an array/scalar).
    #[error("not a JSON-RPC object: {reason}")]
    NotAnObject {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The `jsonrpc` field is missing or not `"2.0"`.
    #[error("missing or invalid jsonrpc version field")]
    InvalidVersion,
    /// The `id` field is present but not a string, integer, or null.
    #[error("invalid id field")]
    InvalidId,
    /// The message has neither `id` nor `method`.
    #[error("message has neither id nor method")]
    Unclassifiable,
}

/// A parsed inbound NDJSON line.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Classified message kind.
    pub kind: MessageKind,
    /// The `params` field, if present.
    pub params: Option<serde_json::Value>,
}

/// Parse a single NDJSON line into an [`InboundMessage`].
///
/// `params` is extracted by removal from the parsed value, so nothing
/// downstream re-parses the line.
pub fn parse_line(raw: &[u8]) -> Result<InboundMessage, ClassifyError> {
    let mut value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| ClassifyError::NotAnObject {
            reason: e.to_string(),
        })?;

    let kind = classify(&value)?;
    let params = value.as_object_mut().and_then(|obj| obj.remove("params"));

    Ok(InboundMessage { kind, params })
}

/// Classify a parsed JSON value without taking ownership.
///
/// Validates `"jsonrpc": "2.0"`, then classifies by `id`/`method` presence.
pub fn classify(value: &serde_json::Value) -> Result<MessageKind, ClassifyError> {
    if !value.is_object() {
        return Err(ClassifyError::NotAnObject {
            reason: "not a JSON object".to_string(),
        });
    }

    let version = value.get("jsonrpc").and_then(|v| v.as_str());
    if version != Some("2.0") {
        return Err(ClassifyError::InvalidVersion);
    }

    let id = value
        .get("id")
        .map(parse_id)
        .transpose()
        .map_err(|_| ClassifyError::InvalidId)?;
    let method = value
        .get("method")
        .and_then(|v| v.as_str())
        .map(String::from);

    match (id, method) {
        (Some(id), Some(method)) => Ok(MessageKind::Request { id, method }),
        (Some(id), None) => Ok(MessageKind::Response { id }),
        (None, Some(method)) => Ok(MessageKind::Notification { method }),
        (None, None) => Err(ClassifyError::Unclassifiable),
    }
}

/// Parse a JSON value into a [`JsonRpcId`].
///
/// Accepts string, integer, or null. Rejects floats, booleans, arrays, objects.
fn parse_id(value: &serde_json::Value) -> Result<JsonRpcId, ()> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().map(JsonRpcId::Number).ok_or(()),
        serde_json::Value::String(s) => Ok(JsonRpcId::String(s.clone())),
        serde_json::Value::Null => Ok(JsonRpcId::Null),
        _ => Err(()),
    }
}
