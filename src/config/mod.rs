//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.docs-mcp-bridge/config.json`
//!    - **Windows:** `%USERPROFILE%\.docs-mcp-bridge\config.json`
//!
//! Unlike an explicit path, a missing default file is not an error: the
//! bridge runs on defaults and the file is created the first time a
//! workspace alias is cached.

mod env;
mod settings;

pub use env::{Environment, API_URL_VAR, INTEGRATION_TOKEN_VAR, LOG_LEVEL_VAR, TOKEN_VAR};
pub use settings::{Config, LoggingConfig, DEFAULT_API_BASE_URL};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the per-project binding file searched from the working directory upwards.
pub const PROJECT_FILE_NAME: &str = ".docs-mcp.json";

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.docs-mcp-bridge/`
/// - **Windows:** `%USERPROFILE%\.docs-mcp-bridge\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".docs-mcp-bridge"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Returns the platform-specific credentials file path.
#[must_use]
pub fn default_credentials_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("credentials.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to [`Config::default`] when that file does not exist.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}
