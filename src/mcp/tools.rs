//! Tool catalog and the tools answered without a network call.
//!
//! `tools/list` always returns the static catalog below, so it works while
//! offline or signed out. Only the names in [`LOCAL_TOOLS`] are handled in
//! process; every other `tools/call` is forwarded to the backend.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::TokenResolver;
use crate::workspace::WorkspaceResolver;

/// Shows the workspace the next call would use.
pub const GET_WORKSPACE: &str = "get_workspace";
/// Sets the cached default workspace.
pub const SET_WORKSPACE: &str = "set_workspace";
/// Reports where the bearer token comes from.
pub const AUTH_STATUS: &str = "auth_status";
/// Explains how to sign in.
pub const LOGIN_INSTRUCTIONS: &str = "login_instructions";

/// Tools answered locally.
pub const LOCAL_TOOLS: [&str; 4] = [GET_WORKSPACE, SET_WORKSPACE, AUTH_STATUS, LOGIN_INSTRUCTIONS];

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallParams {
    /// The explicit `workspace` argument, if given.
    #[must_use]
    pub fn workspace(&self) -> Option<&str> {
        self.arguments.get("workspace").and_then(Value::as_str)
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a successful result holding pretty-printed JSON.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

fn workspace_property() -> Value {
    json!({
        "type": "string",
        "description": "Optional: workspace alias for this call. Outside a project \
                        with a pinned workspace it also becomes the default."
    })
}

fn backend_tool(name: &str, description: &str, properties: Value, required: &[&str]) -> ToolDefinition {
    let mut properties = properties;
    if let Some(obj) = properties.as_object_mut() {
        obj.insert("workspace".to_string(), workspace_property());
    }
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Returns the full tool catalog.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        // === Backend tools ===
        backend_tool(
            "list_workspaces",
            "List the workspaces your account can access, with their aliases.",
            json!({}),
            &[],
        ),
        backend_tool(
            "docs_list",
            "List documents in the workspace, optionally under a folder path.",
            json!({
                "path": { "type": "string", "description": "Optional: folder path to list" },
                "limit": { "type": "integer", "description": "Optional: maximum number of documents" },
                "cursor": { "type": "string", "description": "Optional: pagination cursor" }
            }),
            &[],
        ),
        backend_tool(
            "docs_search",
            "Full-text search across documents in the workspace.",
            json!({
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Optional: maximum number of hits" }
            }),
            &["query"],
        ),
        backend_tool(
            "docs_get",
            "Fetch a document's content and metadata by id or path.",
            json!({
                "id": { "type": "string", "description": "Document id" },
                "path": { "type": "string", "description": "Document path (alternative to id)" }
            }),
            &[],
        ),
        backend_tool(
            "docs_create",
            "Create a new document.",
            json!({
                "path": { "type": "string", "description": "Path for the new document" },
                "title": { "type": "string", "description": "Document title" },
                "content": { "type": "string", "description": "Markdown content" }
            }),
            &["path", "content"],
        ),
        backend_tool(
            "docs_update",
            "Replace the content or title of an existing document.",
            json!({
                "id": { "type": "string", "description": "Document id" },
                "title": { "type": "string", "description": "Optional: new title" },
                "content": { "type": "string", "description": "Optional: new Markdown content" }
            }),
            &["id"],
        ),
        backend_tool(
            "docs_delete",
            "Delete a document.",
            json!({
                "id": { "type": "string", "description": "Document id" }
            }),
            &["id"],
        ),
        // === Local tools ===
        ToolDefinition {
            name: GET_WORKSPACE.to_string(),
            description: Some(
                "Show which workspace the next call will use and where that choice comes from \
                 (explicit argument, project file, or cached default)."
                    .to_string(),
            ),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: SET_WORKSPACE.to_string(),
            description: Some(
                "Set the default workspace for calls that do not name one. A project's \
                 .docs-mcp.json binding still takes precedence inside that project. \
                 Pass null to clear the default."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace": {
                        "type": ["string", "null"],
                        "description": "Workspace alias, or null to clear"
                    }
                },
                "required": ["workspace"]
            }),
        },
        ToolDefinition {
            name: AUTH_STATUS.to_string(),
            description: Some(
                "Report whether the bridge has credentials, which source they come from, \
                 and when the session expires."
                    .to_string(),
            ),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: LOGIN_INSTRUCTIONS.to_string(),
            description: Some("Explain how to sign in to the documentation service.".to_string()),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Handles a local tool call. Returns `None` if `name` is not local.
#[must_use]
pub fn call_local_tool(
    name: &str,
    arguments: &Value,
    tokens: &TokenResolver,
    workspace: &WorkspaceResolver,
) -> Option<ToolCallResult> {
    let result = match name {
        GET_WORKSPACE => get_workspace(workspace),
        SET_WORKSPACE => set_workspace(arguments, workspace),
        AUTH_STATUS => auth_status(tokens),
        LOGIN_INSTRUCTIONS => ToolCallResult::text(login_instructions()),
        _ => return None,
    };
    Some(result)
}

fn get_workspace(workspace: &WorkspaceResolver) -> ToolCallResult {
    let resolved = workspace.resolve(None);
    let binding = workspace.project_binding();
    ToolCallResult::json(&json!({
        "workspace": resolved.as_ref().map(|r| r.alias.as_str()),
        "source": resolved.as_ref().map(|r| r.source),
        "projectFile": binding.as_ref().map(|b| b.path.display().to_string()),
        "globalDefault": workspace.global_default(),
    }))
}

fn set_workspace(arguments: &Value, workspace: &WorkspaceResolver) -> ToolCallResult {
    let alias = match arguments.get("workspace") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Null) | None => None,
        Some(_) => return ToolCallResult::error("workspace must be a string or null"),
    };

    if let Err(e) = workspace.set_global_default(alias) {
        tracing::warn!(error = %e, "set_workspace failed");
        return ToolCallResult::error(format!("Failed to save default workspace: {e}"));
    }

    let mut message = alias.map_or_else(
        || "Default workspace cleared.".to_string(),
        |a| format!("Default workspace set to '{a}'."),
    );
    if let Some(binding) = workspace.project_binding() {
        message.push_str(&format!(
            " Note: {} pins workspace '{}', which takes precedence in this project.",
            binding.path.display(),
            binding.alias
        ));
    }
    ToolCallResult::text(message)
}

fn auth_status(tokens: &TokenResolver) -> ToolCallResult {
    let status = tokens.status();
    let mut value = serde_json::to_value(&status).unwrap_or_else(|_| json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.insert("authenticated".to_string(), Value::from(status.source.is_some()));
        if status.source.is_none() {
            obj.insert("hint".to_string(), Value::from(login_instructions()));
        }
    }
    ToolCallResult::json(&value)
}

/// Human-readable sign-in instructions.
#[must_use]
pub fn login_instructions() -> String {
    format!(
        "To sign in, run `docs-mcp-bridge login` in a terminal and approve the request in \
         your browser. The session is stored locally and refreshed automatically. \
         For non-interactive environments set {} (takes precedence over the session) or {} \
         (used only when no session exists).",
        crate::config::TOKEN_VAR,
        crate::config::INTEGRATION_TOKEN_VAR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tool_definitions_valid() {
        let tools = tool_definitions();
        assert!(!tools.is_empty());

        let mut names = HashSet::new();
        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
            assert!(names.insert(tool.name.clone()), "duplicate tool {}", tool.name);
        }
        for local in LOCAL_TOOLS {
            assert!(names.contains(local));
        }
    }

    #[test]
    fn backend_tools_accept_workspace() {
        let tools = tool_definitions();
        let docs_get = tools.iter().find(|t| t.name == "docs_get").unwrap();
        assert!(docs_get.input_schema["properties"]["workspace"].is_object());
        assert!(!LOCAL_TOOLS.contains(&"docs_get"));
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Hello, world!"),
        }
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn workspace_argument_is_read() {
        let params: ToolCallParams = serde_json::from_value(json!({
            "name": "docs_get",
            "arguments": {"id": "d1", "workspace": "beta"}
        }))
        .unwrap();
        assert_eq!(params.workspace(), Some("beta"));
    }
}
