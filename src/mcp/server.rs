//! MCP bridge server.
//!
//! A small set of methods is answered in process (`initialize`, `ping`,
//! `tools/list`, `resources/list` and the local tools). Everything else is
//! forwarded to the backend with a bearer token and, when one resolves, a
//! workspace alias.
//!
//! # Concurrency
//!
//! Each stdin line is dispatched on its own task so a slow backend call
//! never blocks the reader. Members of one batch are handled in order
//! within their task. Responses are serialised through a single writer
//! (see [`crate::mcp::transport`]) and may reach stdout in any order;
//! clients correlate them by id.
//!
//! # Lifecycle
//!
//! There is no session state gating: `initialize` may be sent any number of
//! times and always returns the same result, and requests are served before
//! it arrives. On EOF or a termination signal the reader stops, in-flight
//! requests are allowed to finish, and the writer drains before exit.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;

use crate::auth::TokenResolver;
use crate::backend::{errors::auth_required, normalize_reply, transport_error, BackendClient};
use crate::mcp::protocol::{
    decode_message, parse_line, Incoming, JsonRpcError, JsonRpcResponse, Message, RequestId,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::tools::{self, ToolCallParams};
use crate::mcp::transport::{self, LineReader};
use crate::workspace::WorkspaceResolver;

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapabilities>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListCapabilities::default()),
            resources: Some(ListCapabilities::default()),
        }
    }
}

/// Capabilities of a listable primitive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The fixed `initialize` result.
#[must_use]
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": ServerCapabilities::default(),
        "serverInfo": ServerInfo::default(),
    })
}

fn to_value<T: Serialize>(message: &T) -> Option<Value> {
    match serde_json::to_value(message) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise response");
            None
        }
    }
}

fn respond(id: Option<RequestId>, result: Value) -> Option<Value> {
    id.and_then(|id| to_value(&JsonRpcResponse::success(id, result)))
}

/// Routes decoded messages to local handlers or the backend.
#[derive(Debug)]
pub struct Dispatcher {
    tokens: TokenResolver,
    workspace: WorkspaceResolver,
    backend: BackendClient,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(
        tokens: TokenResolver,
        workspace: WorkspaceResolver,
        backend: BackendClient,
    ) -> Self {
        Self {
            tokens,
            workspace,
            backend,
        }
    }

    /// Handles one stdin line and returns the responses to write.
    ///
    /// A single request yields at most one response. A batch yields its
    /// members' responses in request order, skipping notifications.
    pub async fn handle_line(&self, line: &str) -> Vec<Value> {
        match parse_line(line) {
            Ok(Incoming::Single(value)) => self.handle_value(value).await.into_iter().collect(),
            Ok(Incoming::Batch(items)) => {
                if items.is_empty() {
                    tracing::warn!("Dropping empty batch");
                    return Vec::new();
                }
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_value(item).await {
                        responses.push(response);
                    }
                }
                responses
            }
            Err(failure) => {
                tracing::warn!(salvaged_id = ?failure.salvaged_id, "Received invalid JSON");
                failure.into_error().and_then(|e| to_value(&e)).into_iter().collect()
            }
        }
    }

    async fn handle_value(&self, value: Value) -> Option<Value> {
        match decode_message(value) {
            Ok(message) => self.handle_message(message).await,
            Err(rejected) => {
                tracing::warn!(id = ?rejected.id, reason = rejected.reason, "Rejected message");
                rejected.into_error().and_then(|e| to_value(&e))
            }
        }
    }

    /// Handles one validated message.
    pub async fn handle_message(&self, message: Message) -> Option<Value> {
        tracing::debug!(method = %message.method, id = ?message.id, "Dispatching");

        let method = message.method.clone();
        match method.as_str() {
            "initialize" => respond(message.id, initialize_result()),
            "initialized" | "notifications/initialized" => {
                tracing::debug!("Client initialised");
                respond(message.id, json!({}))
            }
            // Requests already in flight run to completion.
            "notifications/cancelled" => respond(message.id, json!({})),
            "ping" => respond(message.id, json!({})),
            "tools/list" => respond(message.id, json!({ "tools": tools::tool_definitions() })),
            "resources/list" => respond(message.id, json!({ "resources": [] })),
            "tools/call" => self.handle_tools_call(message).await,
            other if other.starts_with("notifications/") && message.is_notification() => {
                tracing::debug!(method = other, "Ignoring notification");
                None
            }
            _ => self.forward(message, None).await,
        }
    }

    async fn handle_tools_call(&self, message: Message) -> Option<Value> {
        let parsed = message
            .params
            .clone()
            .map(serde_json::from_value::<ToolCallParams>)
            .transpose();

        let params = match parsed {
            Ok(Some(params)) => params,
            Ok(None) => {
                return message.id.and_then(|id| {
                    to_value(&JsonRpcError::invalid_params(id, "Missing tool call params"))
                })
            }
            Err(e) => {
                return message.id.and_then(|id| {
                    to_value(&JsonRpcError::invalid_params(
                        id,
                        format!("Invalid tool call params: {e}"),
                    ))
                })
            }
        };

        if let Some(result) =
            tools::call_local_tool(&params.name, &params.arguments, &self.tokens, &self.workspace)
        {
            tracing::debug!(tool = %params.name, is_error = result.is_error, "Local tool handled");
            return respond(message.id, to_value(&result)?);
        }

        self.forward(message, Some(&params)).await
    }

    async fn forward(&self, message: Message, params: Option<&ToolCallParams>) -> Option<Value> {
        let tool = params.map(|p| p.name.as_str());

        let Some(token) = self.tokens.access_token().await else {
            tracing::info!(method = %message.method, "No credentials available");
            return message.id.and_then(|id| to_value(&auth_required(id)));
        };

        // Resolution walks the directory tree and may rewrite the config.
        let resolver = self.workspace.clone();
        let explicit = params.and_then(ToolCallParams::workspace).map(str::to_string);
        let workspace =
            match tokio::task::spawn_blocking(move || resolver.resolve(explicit.as_deref())).await {
                Ok(workspace) => workspace,
                Err(e) => {
                    tracing::error!(error = %e, "Workspace resolution task failed");
                    None
                }
            };
        tracing::debug!(
            method = %message.method,
            tool,
            token_source = ?token.source,
            workspace = ?workspace,
            "Proxying to backend"
        );

        let result = self
            .backend
            .call(
                &message.to_payload(),
                &token.token,
                workspace.as_ref().map(|w| w.alias.as_str()),
            )
            .await;

        let id = message.id?;
        match result {
            Ok(reply) => Some(normalize_reply(reply, &id, tool)),
            Err(e) => to_value(&transport_error(id, &e)),
        }
    }
}

/// The MCP stdio server.
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    /// Creates a server around `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Serves stdin/stdout until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read or stdout fails for a reason
    /// other than the client closing it.
    pub async fn run(&self) -> io::Result<()> {
        self.serve(LineReader::stdin(), tokio::io::stdout()).await
    }

    /// Serves an arbitrary reader/writer pair.
    ///
    /// # Errors
    ///
    /// See [`McpServer::run`].
    pub async fn serve<R, W>(&self, mut reader: LineReader<R>, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, writer) = transport::channel(writer);
        let mut writer_task = tokio::spawn(writer.run());
        let mut writer_result = None;
        let mut tasks = JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let read_result = loop {
            tokio::select! {
                () = &mut shutdown => break Ok(()),

                finished = &mut writer_task => {
                    tracing::info!("Output closed, stopping");
                    writer_result = Some(finished);
                    break Ok(());
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Request task failed");
                    }
                }

                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let sender = sender.clone();
                        tasks.spawn(async move {
                            for response in dispatcher.handle_line(&line).await {
                                if !sender.send(&response) {
                                    break;
                                }
                            }
                        });
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                },
            }
        };

        tracing::debug!(in_flight = tasks.len(), "Waiting for in-flight requests");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Request task failed");
            }
        }
        drop(sender);

        let finished = match writer_result {
            Some(finished) => finished,
            None => writer_task.await,
        };
        let write_result = match finished {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        };

        match write_result {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::info!("Client closed stdout");
            }
            other => other?,
        }
        read_result
    }
}

/// Resolves on SIGINT or SIGTERM. If handlers cannot be installed it never
/// resolves, leaving EOF as the only way out.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves on Ctrl+C.
#[cfg(windows)]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::warn!(error = %e, "Could not install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
