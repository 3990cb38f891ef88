//! Error types for docs-mcp-bridge.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Variants that wrap tokens or device codes use generic descriptions
//! instead of including the actual values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by the on-disk JSON stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The file exists but could not be read.
    #[error("failed to read {path}")]
    Read {
        /// File being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file contents are not valid JSON for the expected shape.
    #[error("failed to parse {path}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing or atomically replacing the file failed.
    #[error("failed to write {path}")]
    Write {
        /// File being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Serialising the record failed.
    #[error("failed to serialise record for {path}")]
    Serialise {
        /// File the record was destined for.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The blocking task doing the file access panicked or was cancelled.
    #[error("file task for {path} did not complete")]
    Task {
        /// File being accessed.
        path: PathBuf,
        /// The join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Errors from the authentication endpoints and the device flow.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The HTTP request never produced a response (DNS, connect, timeout).
    #[error("auth request to {endpoint} failed")]
    Transport {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success HTTP status.
    #[error("auth endpoint {endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// A response was missing required fields or had the wrong shape.
    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// What was wrong with the response.
        message: String,
    },

    /// The server reported approval without handing out an access token.
    #[error("device flow protocol violation: {0}")]
    ProtocolViolation(String),

    /// The user rejected the authorization request.
    #[error("device authorization was denied")]
    DeviceFlowDenied,

    /// The server reported the device code as expired.
    #[error("device code expired before it was approved")]
    DeviceFlowExpired,

    /// The local deadline (start + `expiresIn`) elapsed while polling.
    #[error("timed out waiting for device authorization")]
    DeviceFlowTimedOut,

    /// The stored session cannot be refreshed and needs a new login.
    #[error("session expired and cannot be refreshed")]
    RefreshUnavailable,

    /// Reading or writing the credentials file failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Returns `true` for failures that may succeed if simply retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors from forwarding a request to the backend JSON-RPC endpoint.
///
/// Only failures where no usable response exists are represented here.
/// Backend-reported errors travel as JSON-RPC error objects instead.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend did not answer within the request timeout.
    #[error("backend request timed out after {seconds}s")]
    Timeout {
        /// Configured timeout in seconds.
        seconds: u64,
    },

    /// No response was received at all.
    #[error("backend request failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The backend answered 2xx with a body that is not a JSON object.
    #[error("backend returned an invalid response body: {message}")]
    InvalidBody {
        /// Description of the decoding failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn auth_status_transience() {
        let server_side = AuthError::Status {
            endpoint: "/api/auth/device/poll",
            status: 503,
        };
        let client_side = AuthError::Status {
            endpoint: "/api/auth/device/poll",
            status: 400,
        };
        assert!(server_side.is_transient());
        assert!(!client_side.is_transient());
        assert!(!AuthError::DeviceFlowDenied.is_transient());
    }

    #[test]
    fn backend_timeout_display() {
        let error = BackendError::Timeout { seconds: 25 };
        assert!(error.to_string().contains("25s"));
    }
}
