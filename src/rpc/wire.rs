//! Wire codec: one JSON-RPC document per delivery.
//!
//! Framing is the transport's job: [`decode`] assumes `bytes` holds exactly
//! one complete document and never buffers. Failures still carry whatever
//! identifier could be salvaged so the dispatcher can answer them.

use serde_json::{Map, Value};

use super::message::{JSONRPC_VERSION, Notification, Request, Response, RpcError};

/// A document that could not be turned into a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// Recovered identifier, if any. `None` answers with `"id": null`.
    pub id: Option<Value>,
    /// Parse-Error or Invalid-Request.
    pub error: RpcError,
}

impl DecodeError {
    fn parse(id: Option<Value>, detail: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError::parse_error(detail),
        }
    }

    fn invalid(id: Option<Value>, detail: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError::invalid_request(detail),
        }
    }
}

/// Decode one inbound document.
pub fn decode(bytes: &[u8]) -> Result<Request, DecodeError> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            let text = String::from_utf8_lossy(bytes);
            return Err(DecodeError::parse(salvage_id(&text), e.to_string()));
        }
    };

    let mut obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => return Err(DecodeError::invalid(None, "batch requests are not supported")),
        _ => return Err(DecodeError::invalid(None, "request must be a JSON object")),
    };

    let id = match obj.remove("id") {
        None => None,
        Some(id @ (Value::Null | Value::Number(_) | Value::String(_))) => Some(id),
        Some(_) => return Err(DecodeError::invalid(None, "id must be a string, number or null")),
    };

    check_version(&obj).map_err(|detail| DecodeError::invalid(id.clone(), detail))?;

    let method = match obj.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        Some(Value::String(_)) => return Err(DecodeError::invalid(id, "method must not be empty")),
        Some(_) => return Err(DecodeError::invalid(id, "method must be a string")),
        None => return Err(DecodeError::invalid(id, "method is missing")),
    };

    let params = obj.remove("params").unwrap_or(Value::Null);

    Ok(Request { method, id, params })
}

fn check_version(obj: &Map<String, Value>) -> Result<(), &'static str> {
    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => Ok(()),
        Some(_) => Err("unsupported jsonrpc version"),
        None => Err("jsonrpc version tag is missing"),
    }
}

/// Best-effort recovery of a scalar `"id"` from a document that failed to
/// parse (truncated, trailing garbage, ...). Only keys of the top-level
/// object count; an `"id"` nested inside `params` is skipped.
fn salvage_id(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' => {
                let end = string_end(bytes, i)?;
                if depth == 1 && &text[i + 1..end] == "id" {
                    if let Some(after_colon) = text[end + 1..].trim_start().strip_prefix(':') {
                        return scalar_prefix(after_colon);
                    }
                }
                i = end;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the quote closing the string that opens at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn scalar_prefix(text: &str) -> Option<Value> {
    let mut values = serde_json::Deserializer::from_str(text.trim_start()).into_iter::<Value>();
    match values.next() {
        Some(Ok(v @ (Value::Number(_) | Value::String(_)))) => Some(v),
        _ => None,
    }
}

/// Serialize a response to its wire bytes.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}

/// Serialize a notification to its wire bytes.
pub fn encode_notification(notification: &Notification) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(notification)
}
