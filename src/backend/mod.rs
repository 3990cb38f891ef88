//! HTTP client for the remote JSON-RPC endpoint.
//!
//! Every proxied message becomes one `POST <apiBase>/mcp/v1/rpc` carrying
//! the bearer token and, when resolved, the workspace alias. There are no
//! automatic retries: whether a document operation is safe to repeat is
//! the backend's call, not the bridge's.

pub mod errors;

pub use errors::{normalize_reply, transport_error, BackendSignal};

use std::time::Duration;

use serde_json::Value;

use crate::error::BackendError;

/// Path of the backend JSON-RPC endpoint.
pub const RPC_PATH: &str = "/mcp/v1/rpc";

/// Header carrying the resolved workspace alias.
pub const WORKSPACE_HEADER: &str = "X-Workspace-Alias";

/// Request timeout, kept below the ~30s the calling client waits so a clean
/// error can be returned before the client gives up.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(25);

/// A raw backend answer: HTTP status plus decoded body.
///
/// Bodies that are not JSON are kept as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
}

impl BackendReply {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Forwards JSON-RPC payloads to the backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl BackendClient {
    /// Creates a client for `api_base_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{RPC_PATH}", api_base_url.trim_end_matches('/')),
            timeout: BACKEND_TIMEOUT,
        }
    }

    /// Overrides the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the RPC endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `payload` and returns whatever the backend answered.
    ///
    /// `jsonrpc: "2.0"` is merged into the payload. Any HTTP status is a
    /// reply; only the absence of a response is an error.
    ///
    /// # Errors
    ///
    /// - `Timeout` if no response arrives within the timeout
    /// - `Transport` if the request could not be completed
    /// - `InvalidBody` if a 2xx body is not a JSON object
    pub async fn call(
        &self,
        payload: &Value,
        token: &str,
        workspace: Option<&str>,
    ) -> Result<BackendReply, BackendError> {
        let mut body = payload.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("jsonrpc".to_string(), Value::from("2.0"));
        }

        let mut request = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(&body);
        if let Some(alias) = workspace {
            request = request.header(WORKSPACE_HEADER, alias);
        }

        let method = payload.get("method").and_then(Value::as_str).unwrap_or("");
        tracing::debug!(method, workspace = ?workspace, "Forwarding to backend");

        let response = request.send().await.map_err(|e| self.map_send_error(&e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_send_error(&e))?;

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(e) if (200..300).contains(&status) => {
                return Err(BackendError::InvalidBody {
                    message: e.to_string(),
                })
            }
            Err(_) => Value::String(text),
        };

        if (200..300).contains(&status) && !body.is_object() {
            return Err(BackendError::InvalidBody {
                message: "expected a JSON object".to_string(),
            });
        }

        tracing::debug!(method, status, "Backend replied");
        Ok(BackendReply { status, body })
    }

    fn map_send_error(&self, error: &reqwest::Error) -> BackendError {
        if error.is_timeout() {
            tracing::warn!(endpoint = %self.endpoint, "Backend request timed out");
            BackendError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            tracing::warn!(endpoint = %self.endpoint, error = %error, "Backend request failed");
            BackendError::Transport {
                message: error.to_string(),
            }
        }
    }
}
