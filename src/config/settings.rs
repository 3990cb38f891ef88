//! Configuration structures for (de)serialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! The file is also written back when the cached workspace alias changes,
//! so every field round-trips.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// API base URL used when neither the config file nor the environment sets one.
pub const DEFAULT_API_BASE_URL: &str = "https://api.docs-mcp.dev";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (preserved, otherwise ignored).
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,

    /// Base URL of the documentation API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Front-end origin used to build the device-flow verification link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_url: Option<String>,

    /// Last workspace alias named explicitly outside a pinned project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_alias: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("api_base_url", &self.api_base_url),
            ("frontend_url", &self.frontend_url),
        ] {
            if let Some(raw) = value {
                validate_http_url(field, raw)?;
            }
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        Ok(())
    }

    /// Returns the API base URL without a trailing slash.
    ///
    /// `env_override` wins over the file; the built-in default is the fallback.
    #[must_use]
    pub fn resolved_api_base_url(&self, env_override: Option<&str>) -> String {
        env_override
            .or(self.api_base_url.as_deref())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

fn validate_http_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::ValidationError {
        message: format!("Invalid {field} '{raw}': {e}"),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError {
            message: format!("Invalid {field} '{raw}': scheme must be http or https"),
        });
    }

    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
