//! Integration tests for MCP protocol handling.
//!
//! These tests drive the bridge over in-memory stdio pipes and a loopback
//! backend, checking request/response pairing, notification handling and
//! proxying.

mod common;

use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use docs_mcp_bridge::auth::TokenStrategy;
use docs_mcp_bridge::mcp::protocol::{decode_message, parse_line, Incoming, RequestId};
use docs_mcp_bridge::mcp::{LineReader, McpServer};

use common::{dispatcher, tool_call, MockBackend};

/// Feeds `input` to a server over in-memory pipes and returns its output lines.
async fn run_session(server: &McpServer, input: &str) -> Vec<Value> {
    let (mut client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, mut client_out) = tokio::io::duplex(64 * 1024);

    client_in.write_all(input.as_bytes()).await.unwrap();
    drop(client_in);

    server
        .serve(LineReader::new(server_in), server_out)
        .await
        .unwrap();

    let mut output = String::new();
    client_out.read_to_string(&mut output).await.unwrap();
    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let Ok(Incoming::Single(value)) = parse_line(json) else {
        panic!("Expected a single message");
    };
    let msg = decode_message(value).unwrap();
    assert_eq!(msg.method, "initialize");
    assert_eq!(msg.id, Some(RequestId::Number(1)));
}

#[test]
fn test_parse_notification() {
    let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    let Ok(Incoming::Single(value)) = parse_line(json) else {
        panic!("Expected a single message");
    };
    assert!(decode_message(value).unwrap().is_notification());
}

#[test]
fn test_parse_invalid_json() {
    assert!(parse_line("not valid json").is_err());
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_one_response_per_request_and_none_for_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Session],
    ));

    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "",
        r#"{"jsonrpc":"2.0","id":"two","method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#,
        r#"{"jsonrpc":"2.0","id":5,"method":"initialize","params":{}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
    ]
    .join("\n")
        + "\n";

    let responses = run_session(&server, &input).await;
    assert_eq!(responses.len(), 5);

    let ids: HashSet<String> = responses.iter().map(|r| r["id"].to_string()).collect();
    let expected: HashSet<String> = ["1", "\"two\"", "3", "4", "5"]
        .into_iter()
        .map(str::to_string)
        .collect();
    assert_eq!(ids, expected);

    for response in &responses {
        assert_eq!(response["jsonrpc"], "2.0");
        assert!(response.get("result").is_some(), "unexpected error: {response}");
    }

    let by_id = |id: Value| responses.iter().find(|r| r["id"] == id).unwrap();
    assert_eq!(by_id(json!(1))["result"], by_id(json!(5))["result"]);
    assert_eq!(by_id(json!(4))["result"], json!({"resources": []}));
    assert!(by_id(json!("two"))["result"]["tools"].as_array().unwrap().len() >= 7);
}

#[tokio::test]
async fn test_tools_list_works_offline_and_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Session],
    ));

    let responses = run_session(
        &server,
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n",
    )
    .await;

    let names: Vec<&str> = responses[0]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"list_workspaces"));
    assert!(names.contains(&"docs_search"));
    assert!(names.contains(&"auth_status"));
}

#[tokio::test]
async fn test_batch_and_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Session],
    ));

    let input = concat!(
        "[{\"jsonrpc\":\"2.0\",\"id\":10,\"method\":\"ping\"},{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"},{\"jsonrpc\":\"2.0\",\"id\":11,\"method\":\"ping\"}]\n",
        "garbage without id\n",
        "{\"jsonrpc\":\"2.0\",\"id\":12,\"method\":\n",
        "{\"jsonrpc\":\"1.0\",\"id\":13,\"method\":\"ping\"}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":14,\"method\":\"ping\"}", // unterminated, dropped
    );

    let responses = run_session(&server, input).await;
    let ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids.len(), 4);

    // Batch members come out in request order, from one task.
    let ten = ids.iter().position(|&id| id == 10).unwrap();
    let eleven = ids.iter().position(|&id| id == 11).unwrap();
    assert!(ten < eleven);

    let by_id = |id: i64| responses.iter().find(|r| r["id"] == id).unwrap();
    assert_eq!(by_id(12)["error"]["code"], -32700);
    assert_eq!(by_id(13)["error"]["code"], -32600);
    assert!(!ids.contains(&14));
}

#[tokio::test]
async fn test_request_is_proxied_with_bearer_and_backfilled() {
    let backend = MockBackend::start(|request| {
        let id = request.body["id"].clone();
        (
            200,
            json!({"result": {"content": [{"type": "text", "text": "hit"}], "echo": id}})
                .to_string(),
        )
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        &backend.base_url,
        vec![TokenStrategy::Override("override-token".to_string())],
    ));

    let line = tool_call(21, "docs_search", &json!({"query": "install"}));
    let responses = run_session(&server, &(line + "\n")).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["jsonrpc"], "2.0");
    assert_eq!(responses[0]["id"], 21);
    assert_eq!(responses[0]["result"]["echo"], 21);

    let requests = backend.requests_to("/mcp/v1/rpc");
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.header("authorization"), Some("Bearer override-token"));
    assert_eq!(sent.header("x-workspace-alias"), None);
    assert_eq!(sent.body["jsonrpc"], "2.0");
    assert_eq!(sent.body["params"]["arguments"]["query"], "install");
}

#[tokio::test]
async fn test_forwarded_notification_gets_no_response() {
    let backend = MockBackend::json(200, json!({})).await;
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        &backend.base_url,
        vec![TokenStrategy::Override("t".to_string())],
    ));

    let responses = run_session(
        &server,
        "{\"jsonrpc\":\"2.0\",\"method\":\"custom/progress\",\"params\":{}}\n",
    )
    .await;

    assert!(responses.is_empty());
    assert_eq!(backend.requests_to("/mcp/v1/rpc").len(), 1);
}

#[tokio::test]
async fn test_unreachable_backend_yields_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Override("t".to_string())],
    ));

    let line = tool_call(30, "docs_get", &json!({"id": "d1"}));
    let responses = run_session(&server, &(line + "\n")).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 30);
    assert_eq!(responses[0]["error"]["code"], -32603);
}

#[tokio::test]
async fn test_backend_jsonrpc_error_is_forwarded() {
    let backend = MockBackend::json(
        200,
        json!({"jsonrpc": "2.0", "id": 40, "error": {"code": -32601, "message": "Unknown tool"}}),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        &backend.base_url,
        vec![TokenStrategy::Override("t".to_string())],
    ));

    let line = tool_call(40, "docs_frobnicate", &json!({}));
    let responses = run_session(&server, &(line + "\n")).await;

    assert_eq!(responses[0]["error"]["code"], -32601);
    assert_eq!(responses[0]["error"]["message"], "Unknown tool");
}

// =============================================================================
// Stdio Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_line_split_across_task_completion_is_answered() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Session],
    ));

    let (mut client_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, mut client_out) = tokio::io::duplex(64 * 1024);

    // Request 1 finishes while the reader holds half of request 2.
    let feeder = tokio::spawn(async move {
        client_in
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        client_in
            .write_all(b"\"method\":\"ping\"}\n")
            .await
            .unwrap();
    });

    server
        .serve(LineReader::new(server_in), server_out)
        .await
        .unwrap();
    feeder.await.unwrap();

    let mut output = String::new();
    client_out.read_to_string(&mut output).await.unwrap();
    let ids: HashSet<i64> = output
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, HashSet::from([1, 2]));
}

#[tokio::test]
async fn test_slow_backend_call_does_not_block_later_lines() {
    let backend = MockBackend::start_delayed(
        |_: &common::CapturedRequest| (200, json!({"result": {}}).to_string()),
        |request: &common::CapturedRequest| {
            if request.body["id"] == 1 {
                Duration::from_millis(500)
            } else {
                Duration::ZERO
            }
        },
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        &backend.base_url,
        vec![TokenStrategy::Override("t".to_string())],
    ));

    let input = format!(
        "{}\n{}\n",
        tool_call(1, "docs_search", &json!({"query": "slow"})),
        tool_call(2, "docs_list", &json!({}))
    );
    let responses = run_session(&server, &input).await;

    let ids: Vec<&Value> = responses.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, vec![&json!(2), &json!(1)]);
}

/// A stdout whose reader has gone away.
struct ClosedPipe;

impl AsyncWrite for ClosedPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_closed_stdout_is_a_clean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let server = McpServer::new(dispatcher(
        dir.path(),
        "http://127.0.0.1:9",
        vec![TokenStrategy::Session],
    ));

    let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
    let result = server.serve(LineReader::new(input), ClosedPipe).await;
    assert!(result.is_ok(), "unexpected error: {result:?}");
}
