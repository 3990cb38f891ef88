//! docs-mcp-bridge: stdio MCP bridge to a hosted documentation service
//!
//! An MCP client launches the bridge as a subprocess and talks JSON-RPC over
//! stdin/stdout. The bridge forwards each call to the remote
//! documentation API and takes care of the parts a plain proxy cannot:
//!
//! - **Tokens**: override token, then the stored device-flow session
//!   (refreshed shortly before expiry), then an integration token
//! - **Workspaces**: explicit argument, then a `.docs-mcp.json` project
//!   binding, then a cached global default
//! - **Errors**: backend authentication and workspace errors are remapped to
//!   dedicated JSON-RPC codes with remediation hints
//!
//! # Modules
//!
//! - [`auth`]: Device authorization flow, credentials and token resolution
//! - [`backend`]: HTTP client for the remote JSON-RPC endpoint
//! - [`config`]: Configuration loading, validation and environment
//! - [`error`]: Error types
//! - [`mcp`]: MCP stdio protocol, dispatcher and local tools
//! - [`store`]: Atomic JSON file persistence
//! - [`workspace`]: Workspace alias resolution

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod mcp;
pub mod store;
pub mod workspace;
