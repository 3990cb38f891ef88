//! Bearer token resolution.
//!
//! Tokens come from an ordered list of [`TokenStrategy`] values, each tried
//! only when the previous one yields nothing:
//!
//! 1. [`TokenStrategy::Override`]: an explicit token, used as-is
//! 2. [`TokenStrategy::Session`]: the persisted device-flow session, refreshed
//!    first when it is inside the refresh window
//! 3. [`TokenStrategy::Integration`]: a long-lived integration token
//!
//! Interactive sessions beat static integration tokens and are kept fresh
//! automatically; static tokens are the fallback for headless use.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::auth::api::AuthApi;
use crate::auth::credentials::Credentials;
use crate::config::Environment;
use crate::error::{AuthError, StoreError};
use crate::store::CredentialStore;

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSourceKind {
    /// Explicit override token.
    Override,
    /// Persisted user session.
    Session,
    /// Integration token.
    Integration,
}

/// One link in the token priority chain.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenStrategy {
    /// A fixed override token. Never refreshed.
    Override(String),
    /// The session in the credential store.
    Session,
    /// A fixed integration token. Never refreshed.
    Integration(String),
}

impl TokenStrategy {
    /// Builds the standard chain from the environment.
    #[must_use]
    pub fn chain(env: &Environment) -> Vec<Self> {
        let mut chain = Vec::with_capacity(3);
        if let Some(token) = &env.override_token {
            chain.push(Self::Override(token.clone()));
        }
        chain.push(Self::Session);
        if let Some(token) = &env.integration_token {
            chain.push(Self::Integration(token.clone()));
        }
        chain
    }

    const fn kind(&self) -> TokenSourceKind {
        match self {
            Self::Override(_) => TokenSourceKind::Override,
            Self::Session => TokenSourceKind::Session,
            Self::Integration(_) => TokenSourceKind::Integration,
        }
    }
}

impl std::fmt::Debug for TokenStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// A usable bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer value.
    pub token: String,
    /// Which strategy produced it.
    pub source: TokenSourceKind,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Snapshot of the authentication state, computed without refreshing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    /// Source that would be used for the next request, if any.
    pub source: Option<TokenSourceKind>,
    /// Signed-in user email, for session tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Session expiry, for session tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the session will be refreshed before its next use.
    pub needs_refresh: bool,
    /// Whether the session holds a refresh token.
    pub refreshable: bool,
}

/// Resolves bearer tokens following a [`TokenStrategy`] chain.
#[derive(Debug)]
pub struct TokenResolver {
    strategies: Vec<TokenStrategy>,
    credentials: CredentialStore,
    auth: AuthApi,
    refresh_lock: Mutex<()>,
}

impl TokenResolver {
    /// Creates a resolver.
    ///
    /// `auth` supplies the HTTP client for refreshes; the base URL comes
    /// from the stored session itself.
    #[must_use]
    pub fn new(strategies: Vec<TokenStrategy>, credentials: CredentialStore, auth: AuthApi) -> Self {
        Self {
            strategies,
            credentials,
            auth,
            refresh_lock: Mutex::new(()),
        }
    }

    /// The credential store this resolver reads.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Returns the first token the chain yields, or `None` if the caller
    /// must authenticate.
    pub async fn access_token(&self) -> Option<AccessToken> {
        for strategy in &self.strategies {
            let token = match strategy {
                TokenStrategy::Override(token) | TokenStrategy::Integration(token) => {
                    Some(token.clone())
                }
                TokenStrategy::Session => self.session_token().await,
            };
            if let Some(token) = token {
                tracing::debug!(source = ?strategy.kind(), "Resolved access token");
                return Some(AccessToken {
                    token,
                    source: strategy.kind(),
                });
            }
        }
        tracing::debug!("No access token available");
        None
    }

    /// Reports which source would be used, without refreshing anything.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        for strategy in &self.strategies {
            match strategy {
                TokenStrategy::Session => {
                    if let Some(creds) = self.load_session() {
                        return AuthStatus {
                            source: Some(TokenSourceKind::Session),
                            user_email: creds.user_email().map(str::to_string),
                            expires_at: creds.access_expires_at,
                            needs_refresh: creds.needs_refresh(Utc::now()),
                            refreshable: creds.can_refresh(),
                        };
                    }
                }
                other => {
                    return AuthStatus {
                        source: Some(other.kind()),
                        ..AuthStatus::default()
                    };
                }
            }
        }
        AuthStatus::default()
    }

    fn load_session(&self) -> Option<Credentials> {
        session_only(self.credentials.load())
    }

    async fn load_session_async(&self) -> Option<Credentials> {
        session_only(self.credentials.load_async().await)
    }

    async fn session_token(&self) -> Option<String> {
        let creds = self.load_session_async().await?;
        if !creds.needs_refresh(Utc::now()) {
            return Some(creds.access_token);
        }

        // One refresh at a time; a concurrent caller may already have
        // rotated the refresh token, so re-read under the lock.
        let _guard = self.refresh_lock.lock().await;
        let creds = self.load_session_async().await?;
        if !creds.needs_refresh(Utc::now()) {
            return Some(creds.access_token);
        }

        match self.refresh(creds).await {
            Ok(refreshed) => Some(refreshed.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed, discarding stored session");
                if let Err(e) = self.credentials.clear_async().await {
                    tracing::warn!(error = %e, "Failed to delete stale credentials");
                }
                None
            }
        }
    }

    /// Refreshes `creds` and writes the result back.
    ///
    /// A failure to persist the refreshed session is logged but the new
    /// token is still returned.
    ///
    /// # Errors
    ///
    /// `RefreshUnavailable` when there is no refresh token, otherwise any
    /// error from the refresh endpoint.
    pub async fn refresh(&self, mut creds: Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = creds
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::RefreshUnavailable)?;

        let grant = self
            .auth
            .with_base_url(&creds.api_base_url)
            .refresh(&refresh_token)
            .await?;

        creds.apply_refresh(grant, Utc::now());
        if let Err(e) = self.credentials.save_async(creds.clone()).await {
            tracing::warn!(error = %e, "Refreshed session could not be persisted");
        }
        tracing::info!(expires_at = ?creds.access_expires_at, "Session refreshed");
        Ok(creds)
    }
}

fn session_only(loaded: Result<Option<Credentials>, StoreError>) -> Option<Credentials> {
    match loaded {
        Ok(Some(creds)) if creds.is_session() => Some(creds),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable credentials file");
            None
        }
    }
}
