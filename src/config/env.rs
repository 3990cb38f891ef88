//! Environment inputs, read once at startup.

/// Override bearer token. Highest priority, never refreshed.
pub const TOKEN_VAR: &str = "DOCS_MCP_TOKEN";

/// Long-lived integration token. Lowest priority, never refreshed.
pub const INTEGRATION_TOKEN_VAR: &str = "DOCS_MCP_INTEGRATION_TOKEN";

/// API base URL override.
pub const API_URL_VAR: &str = "DOCS_MCP_API_URL";

/// Log verbosity (trace, debug, info, warn, error).
pub const LOG_LEVEL_VAR: &str = "DOCS_MCP_LOG_LEVEL";

/// Snapshot of the environment variables the bridge consumes.
///
/// Empty or whitespace-only values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Value of [`TOKEN_VAR`].
    pub override_token: Option<String>,
    /// Value of [`INTEGRATION_TOKEN_VAR`].
    pub integration_token: Option<String>,
    /// Value of [`API_URL_VAR`].
    pub api_url: Option<String>,
    /// Value of [`LOG_LEVEL_VAR`].
    pub log_level: Option<String>,
}

impl Environment {
    /// Reads the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the snapshot from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            override_token: read(TOKEN_VAR),
            integration_token: read(INTEGRATION_TOKEN_VAR),
            api_url: read(API_URL_VAR),
            log_level: read(LOG_LEVEL_VAR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_unset() {
        let env = Environment::from_lookup(|name| match name {
            TOKEN_VAR => Some("   ".to_string()),
            INTEGRATION_TOKEN_VAR => Some(" int-token \n".to_string()),
            _ => None,
        });
        assert_eq!(env.override_token, None);
        assert_eq!(env.integration_token.as_deref(), Some("int-token"));
        assert_eq!(env.api_url, None);
    }
}
