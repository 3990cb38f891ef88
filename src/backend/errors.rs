//! Normalisation of backend replies into JSON-RPC responses.
//!
//! Two backend signals are recognised and remapped to dedicated error codes
//! with remediation hints: authentication required and workspace required.
//! Every other backend error reaches the client unchanged.

use serde_json::{json, Map, Value};

use crate::backend::BackendReply;
use crate::error::BackendError;
use crate::mcp::protocol::{
    ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId, AUTH_REQUIRED_CODE,
    BACKEND_ERROR_CODE, WORKSPACE_REQUIRED_CODE,
};

/// Tool whose own workspace-required error gets a dedicated hint.
pub const LIST_WORKSPACES_TOOL: &str = "list_workspaces";

const AUTH_CODES: [&str; 3] = ["AUTH_REQUIRED", "UNAUTHORIZED", "UNAUTHENTICATED"];
const WORKSPACE_CODE: &str = "WORKSPACE_REQUIRED";

/// A backend error condition the bridge knows how to explain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSignal {
    /// Credentials missing, expired or rejected.
    AuthRequired,
    /// The caller has several workspaces and none was selected.
    WorkspaceRequired {
        /// Tool that triggered it, as reported by the backend.
        tool_name: Option<String>,
    },
}

/// Looks for a known signal in an HTTP status and body.
///
/// String codes are searched in `error.data.code`, `error.code` and a
/// top-level `code`.
#[must_use]
pub fn detect_signal(status: u16, body: &Value) -> Option<BackendSignal> {
    let error = body.get("error");
    let data = error.and_then(|e| e.get("data"));

    let codes = [
        data.and_then(|d| d.get("code")),
        error.and_then(|e| e.get("code")),
        body.get("code"),
    ];
    let code = codes
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_ascii_uppercase);

    match code.as_deref() {
        Some(WORKSPACE_CODE) => {
            let tool_name = [data, error, Some(body)]
                .into_iter()
                .flatten()
                .find_map(|v| v.get("toolName").and_then(Value::as_str))
                .map(str::to_string);
            Some(BackendSignal::WorkspaceRequired { tool_name })
        }
        Some(c) if AUTH_CODES.contains(&c) => Some(BackendSignal::AuthRequired),
        _ if status == 401 => Some(BackendSignal::AuthRequired),
        _ => None,
    }
}

/// Error returned when no token is available or the backend rejected it.
#[must_use]
pub fn auth_required(id: RequestId) -> JsonRpcError {
    JsonRpcError::new(
        id,
        JsonRpcErrorData::with_message(
            ErrorCode::ServerError(AUTH_REQUIRED_CODE),
            "Authentication required",
        )
        .with_data(json!({
            "code": "AUTH_REQUIRED",
            "hint": "Run `docs-mcp-bridge login` in a terminal to sign in, \
                     or set DOCS_MCP_TOKEN for non-interactive use.",
        })),
    )
}

/// Error returned when the backend needs a workspace to be selected.
///
/// `list_workspaces` gets its own hint: telling the caller to list
/// workspaces would send it in a circle.
#[must_use]
pub fn workspace_required(id: RequestId, tool_name: Option<&str>) -> JsonRpcError {
    let hint = if tool_name == Some(LIST_WORKSPACES_TOOL) {
        "Your account belongs to several workspaces and the backend could not \
         pick one for list_workspaces. Pass a `workspace` argument with one of \
         your workspace aliases, or call set_workspace, then retry."
    } else {
        "Your account belongs to several workspaces. Call list_workspaces to \
         see them, then pass a `workspace` argument or call set_workspace."
    };

    JsonRpcError::new(
        id,
        JsonRpcErrorData::with_message(
            ErrorCode::ServerError(WORKSPACE_REQUIRED_CODE),
            "Workspace required",
        )
        .with_data(json!({
            "code": WORKSPACE_CODE,
            "toolName": tool_name,
            "hint": hint,
        })),
    )
}

/// Error returned when the backend could not be reached.
#[must_use]
pub fn transport_error(id: RequestId, error: &BackendError) -> JsonRpcError {
    JsonRpcError::internal_error(id, error.to_string())
}

fn signal_error(id: RequestId, signal: BackendSignal, request_tool: Option<&str>) -> JsonRpcError {
    match signal {
        BackendSignal::AuthRequired => auth_required(id),
        BackendSignal::WorkspaceRequired { tool_name } => {
            workspace_required(id, tool_name.as_deref().or(request_tool))
        }
    }
}

fn backfill(mut obj: Map<String, Value>, id: &RequestId) -> Value {
    obj.insert("jsonrpc".to_string(), Value::from("2.0"));
    if obj.get("id").map_or(true, Value::is_null) {
        obj.insert("id".to_string(), id.to_value());
    }
    Value::Object(obj)
}

fn to_value(error: &JsonRpcError) -> Value {
    serde_json::to_value(error).unwrap_or(Value::Null)
}

/// Turns a backend reply into the JSON-RPC object to send to the client.
///
/// `request_tool` is the tool named in the proxied `tools/call`, used when
/// the backend does not say which tool needed a workspace.
#[must_use]
pub fn normalize_reply(reply: BackendReply, id: &RequestId, request_tool: Option<&str>) -> Value {
    if let Some(signal) = detect_signal(reply.status, &reply.body) {
        let has_error = reply.body.get("error").is_some();
        // A signal in a 2xx body only counts when it is an error.
        if !reply.is_success() || has_error {
            tracing::info!(?signal, status = reply.status, "Remapping backend error");
            return to_value(&signal_error(id.clone(), signal, request_tool));
        }
    }

    let status = reply.status;
    let success = reply.is_success();
    match reply.body {
        Value::Object(obj) if success => backfill(obj, id),
        Value::Object(obj) if obj.get("error").is_some_and(Value::is_object) => {
            backfill(obj, id)
        }
        body => {
            let message = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map_or_else(|| format!("Backend returned HTTP {status}"), str::to_string);
            let code = if status >= 500 {
                ErrorCode::InternalError
            } else {
                ErrorCode::ServerError(BACKEND_ERROR_CODE)
            };
            to_value(&JsonRpcError::new(
                id.clone(),
                JsonRpcErrorData::with_message(code, message)
                    .with_data(json!({ "status": status, "body": body })),
            ))
        }
    }
}
