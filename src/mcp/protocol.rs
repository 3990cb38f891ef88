//! JSON-RPC 2.0 message types for the MCP stdio channel.
//!
//! # Message Types
//!
//! - **Request**: a message with a string or integer `id`, expecting exactly one response
//! - **Notification**: `id` absent or `null`; never answered
//! - **Batch**: a JSON array of the above, answered member by member
//!
//! # Unanswerable Errors
//!
//! Clients reject error objects with a `null` id, so a problem that cannot
//! be tied to a request id (unparsable JSON with no recoverable `id`, an
//! invalid notification, an empty batch) is logged and dropped rather than
//! answered.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "docs-mcp-bridge";

/// Custom error code: no usable credentials, or the backend rejected them.
pub const AUTH_REQUIRED_CODE: i32 = -32001;

/// Custom error code: the backend needs a workspace to be selected.
pub const WORKSPACE_REQUIRED_CODE: i32 = -32002;

/// Generic code for backend errors that were not JSON-RPC shaped.
pub const BACKEND_ERROR_CODE: i32 = -32000;

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl RequestId {
    /// Converts a JSON value into an id, if it has a valid id type.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Returns the id as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A validated request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// `None` for notifications.
    pub id: Option<RequestId>,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters for the method.
    pub params: Option<Value>,
}

impl Message {
    /// Returns `true` if no response may be sent.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Re-encodes the message as a JSON-RPC object for forwarding.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), Value::from("2.0"));
        if let Some(id) = &self.id {
            obj.insert("id".to_string(), id.to_value());
        }
        obj.insert("method".to_string(), Value::from(self.method.as_str()));
        if let Some(params) = &self.params {
            obj.insert("params".to_string(), params.clone());
        }
        Value::Object(obj)
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Server-defined error.
    ServerError(i32),
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError(code) => code,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError(_) => "Server error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
///
/// Always carries a real request id; see the module docs.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to.
    pub id: RequestId,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response for a salvaged id.
    #[must_use]
    pub fn parse_error(id: RequestId) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId, reason: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::from_code(ErrorCode::InvalidRequest)
                .with_data(serde_json::json!({ "reason": reason })),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// One decoded stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A single JSON value (normally an object).
    Single(Value),
    /// A batch; members are dispatched in order.
    Batch(Vec<Value>),
}

/// A stdin line that is not valid JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Id recovered from the raw text, if any.
    pub salvaged_id: Option<RequestId>,
}

impl ParseFailure {
    /// The error to send, if the line's id could be recovered.
    #[must_use]
    pub fn into_error(self) -> Option<JsonRpcError> {
        self.salvaged_id.map(JsonRpcError::parse_error)
    }
}

/// A JSON value that is not a valid request or notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// The message's id, when it had a usable one.
    pub id: Option<RequestId>,
    /// What was wrong.
    pub reason: &'static str,
}

impl Rejected {
    /// The Invalid Request error to send, if the message had an id.
    #[must_use]
    pub fn into_error(self) -> Option<JsonRpcError> {
        let reason = self.reason;
        self.id.map(|id| JsonRpcError::invalid_request(id, reason))
    }
}

/// Parses one line of input.
///
/// # Errors
///
/// Returns a [`ParseFailure`] (with any salvageable id) if the line is not JSON.
pub fn parse_line(line: &str) -> Result<Incoming, ParseFailure> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Array(items)) => Ok(Incoming::Batch(items)),
        Ok(value) => Ok(Incoming::Single(value)),
        Err(_) => Err(ParseFailure {
            salvaged_id: salvage_id(line),
        }),
    }
}

/// Recovers the top-level `"id"` from text that failed to parse.
///
/// Only a key at object depth 1 counts; an `"id"` nested in `params` is
/// never mistaken for the request id.
#[must_use]
pub fn salvage_id(raw: &str) -> Option<RequestId> {
    static ID_VALUE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = ID_VALUE
        .get_or_init(|| {
            Regex::new(r#"^\s*:\s*(?:(-?\d+)\s*(?:[,}]|$)|("(?:[^"\\]|\\.)*"))"#).ok()
        })
        .as_ref()?;

    let captures = pattern.captures(top_level_id_key(raw)?)?;
    if let Some(number) = captures.get(1) {
        number.as_str().parse().ok().map(RequestId::Number)
    } else {
        serde_json::from_str::<String>(captures.get(2)?.as_str())
            .ok()
            .map(RequestId::String)
    }
}

/// Returns the text following the first `"id"` key at depth 1.
fn top_level_id_key(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut depth = 0_usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b'"' => {
                let start = i + 1;
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                let rest = &raw[i + 1..];
                if depth == 1 && &raw[start..i] == "id" && rest.trim_start().starts_with(':') {
                    return Some(rest);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Validates a JSON value as a request or notification.
///
/// # Errors
///
/// Returns [`Rejected`] (keyed to the id when one is present) if the value
/// is not an object, has a wrong `jsonrpc` version, an unusable id, or no
/// method.
pub fn decode_message(value: Value) -> Result<Message, Rejected> {
    let Value::Object(mut obj) = value else {
        return Err(Rejected {
            id: None,
            reason: "message must be a JSON object",
        });
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(raw) => match RequestId::from_value(&raw) {
            Some(id) => Some(id),
            None => {
                // No usable id to answer under, so the client never hears back.
                tracing::warn!(id = %raw, "Dropping message with unusable id");
                return Err(Rejected {
                    id: None,
                    reason: "id must be a string or an i64 integer",
                });
            }
        },
    };

    let reject = |reason| Rejected {
        id: id.clone(),
        reason,
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some("2.0") {
            return Err(reject("jsonrpc field must be \"2.0\""));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        Some(_) => return Err(reject("method must be a non-empty string")),
        None => return Err(reject("method is required")),
    };

    let params = obj.remove("params").filter(|p| !p.is_null());

    Ok(Message { id, method, params })
}
