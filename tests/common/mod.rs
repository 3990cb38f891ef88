//! Shared helpers for integration tests.
//!
//! [`MockBackend`] is a minimal HTTP/1.1 responder on a loopback port. It
//! records every request and answers with whatever the handler returns.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use docs_mcp_bridge::auth::{AuthApi, TokenResolver, TokenStrategy};
use docs_mcp_bridge::backend::BackendClient;
use docs_mcp_bridge::mcp::Dispatcher;
use docs_mcp_bridge::store::{ConfigStore, CredentialStore};
use docs_mcp_bridge::workspace::WorkspaceResolver;

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

type Handler = dyn Fn(&CapturedRequest) -> (u16, String) + Send + Sync;
type Delay = dyn Fn(&CapturedRequest) -> Duration + Send + Sync;

/// Loopback HTTP server for backend and auth endpoints.
pub struct MockBackend {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockBackend {
    /// Starts a server answering every request with `handler`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        Self::start_delayed(handler, |_: &CapturedRequest| Duration::ZERO).await
    }

    /// Like [`MockBackend::start`], holding each response back by `delay`.
    pub async fn start_delayed<F, D>(handler: F, delay: D) -> Self
    where
        F: Fn(&CapturedRequest) -> (u16, String) + Send + Sync + 'static,
        D: Fn(&CapturedRequest) -> Duration + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        let delay: Arc<Delay> = Arc::new(delay);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                let handler = Arc::clone(&handler);
                let delay = Arc::clone(&delay);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, log, handler, delay).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    /// Starts a server answering every request with the same JSON.
    pub async fn json(status: u16, body: Value) -> Self {
        let body = body.to_string();
        Self::start(move |_| (status, body.clone())).await
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<CapturedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    log: Arc<Mutex<Vec<CapturedRequest>>>,
    handler: Arc<Handler>,
    delay: Arc<Delay>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let header_end = loop {
        let mut chunk = [0_u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0_u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let request = CapturedRequest {
        method,
        path,
        headers,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    let (status, response_body) = handler(&request);
    let wait = delay(&request);
    log.lock().unwrap().push(request);
    tokio::time::sleep(wait).await;

    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
        reason(status),
        response_body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Builds a dispatcher whose stores live in `dir` and whose API is `base_url`.
pub fn dispatcher(dir: &Path, base_url: &str, strategies: Vec<TokenStrategy>) -> Dispatcher {
    let http = reqwest::Client::new();
    let tokens = TokenResolver::new(
        strategies,
        CredentialStore::new(dir.join("credentials.json")),
        AuthApi::new(http.clone(), base_url),
    );
    let workspace = WorkspaceResolver::new(ConfigStore::new(dir.join("config.json")), dir);
    Dispatcher::new(tokens, workspace, BackendClient::new(http, base_url))
}

/// A `tools/call` request line.
pub fn tool_call(id: i64, name: &str, arguments: &Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string()
}
