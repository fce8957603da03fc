//! JSON-RPC 2.0 message types.
//!
//! Requests are parsed loosely (see [`wire`](super::wire)) so malformed
//! documents can still be answered; outbound types serialize to exactly
//! the shapes the peer expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol-version tag carried by every document.
pub const JSONRPC_VERSION: &str = "2.0";

// ── Standard error codes ─────────────────────────────────────

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// First code of the range reserved for service-defined errors.
pub const APPLICATION_ERROR_BASE: i64 = 1000;

/// Inbound request or peer notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    /// `None` when the peer sent a notification.
    pub id: Option<Value>,
    /// `Value::Null` when the peer omitted `params`.
    pub params: Value,
}

impl Request {
    /// Whether the peer expects a response.
    pub fn expects_response(&self) -> bool {
        self.id.is_some()
    }
}

/// Error object carried in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error").with_data(Value::String(detail.into()))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request").with_data(Value::String(detail.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, "Invalid params").with_data(Value::String(detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, "Internal error").with_data(Value::String(detail.into()))
    }

    /// Service-defined error; `offset` is added to [`APPLICATION_ERROR_BASE`].
    pub fn application(offset: i64, message: impl Into<String>) -> Self {
        Self::new(APPLICATION_ERROR_BASE + offset, message)
    }
}

/// Exactly one of `result` / `error`, enforced by the type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

/// Outbound response to an identified request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    /// Echoed id, or `null` when none could be recovered.
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.unwrap_or(Value::Null),
            outcome: Outcome::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// Server-initiated event push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
        }
    }
}
