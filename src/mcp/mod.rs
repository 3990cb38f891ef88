//! Model Context Protocol (MCP) stdio front end.
//!
//! The client talks newline-delimited JSON-RPC 2.0 over stdin/stdout. A few
//! methods are answered locally; the rest are proxied to the documentation
//! backend over HTTPS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MCP Bridge                            │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│ Local tools │      │
//! │   │   (stdio)   │    │ (per line)  │    └─────────────┘      │
//! │   └─────────────┘    └─────────────┘                         │
//! │          ▲                  │  token + workspace             │
//! │          │                  ▼                                │
//! │   ┌─────────────┐    ┌─────────────┐                         │
//! │   │   Writer    │◀───│  Backend    │───▶ POST /mcp/v1/rpc    │
//! │   │  (single)   │    │  client     │                         │
//! │   └─────────────┘    └─────────────┘                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcResponse, Message, RequestId, MCP_PROTOCOL_VERSION};
pub use server::{Dispatcher, McpServer};
pub use transport::LineReader;
