//! The persisted session record.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::api::TokenGrant;

/// Sessions expiring within this many seconds of "now" are refreshed first.
pub const REFRESH_WINDOW_SECS: i64 = 5 * 60;

/// What kind of token a [`Credentials`] record holds.
///
/// Only interactive sessions are ever persisted; override and integration
/// tokens come from the environment and are never written to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// A user session obtained through the device flow.
    Session,
    /// Placeholder record carrying no usable session.
    #[default]
    None,
}

/// Identity of the signed-in user, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Backend user id.
    #[serde(default)]
    pub id: Option<String>,
    /// User email address.
    #[serde(default)]
    pub email: Option<String>,
}

/// A stored session token bundle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Record kind; only `session` records are used for authentication.
    #[serde(default)]
    pub kind: CredentialKind,
    /// Base URL the session was issued by, used for refreshing it.
    pub api_base_url: String,
    /// Signed-in user, if the backend reported one.
    #[serde(default)]
    pub user: Option<UserInfo>,
    /// Bearer token.
    pub access_token: String,
    /// Expiry of `access_token`. Absent means already expired.
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Refresh token. Written as an explicit `null` when the server gave none.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl Credentials {
    /// Builds a session record from a freshly issued grant.
    #[must_use]
    pub fn from_grant(api_base_url: &str, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            kind: CredentialKind::Session,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            user: grant.user,
            access_token: grant.access_token,
            access_expires_at: grant.expires_at,
            refresh_token: grant.refresh_token,
            updated_at: now,
        }
    }

    /// Folds a refresh response into this record.
    ///
    /// A grant without a refresh token keeps the current one; the server is
    /// free not to rotate it.
    pub fn apply_refresh(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.access_token = grant.access_token;
        self.access_expires_at = grant.expires_at;
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        if grant.user.is_some() {
            self.user = grant.user;
        }
        self.updated_at = now;
    }

    /// Returns `true` if this record holds a usable user session.
    #[must_use]
    pub fn is_session(&self) -> bool {
        self.kind == CredentialKind::Session && !self.access_token.is_empty()
    }

    /// Returns `true` if the access token expires within the refresh window
    /// of `now` (inclusive), has already expired, or has no known expiry.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at
            .map_or(true, |expires| expires <= now + TimeDelta::seconds(REFRESH_WINDOW_SECS))
    }

    /// Returns `true` if the session can be renewed without a new login.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Email of the signed-in user, if known.
    #[must_use]
    pub fn user_email(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.email.as_deref())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .field("api_base_url", &self.api_base_url)
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires: Option<DateTime<Utc>>) -> Credentials {
        Credentials {
            kind: CredentialKind::Session,
            api_base_url: "https://docs.example.com".to_string(),
            user: None,
            access_token: "access".to_string(),
            access_expires_at: expires,
            refresh_token: Some("refresh".to_string()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn refresh_window_is_inclusive() {
        let now = Utc::now();
        let at_boundary = session_expiring_at(Some(now + TimeDelta::seconds(300)));
        let past_boundary = session_expiring_at(Some(now + TimeDelta::seconds(301)));

        assert!(at_boundary.needs_refresh(now));
        assert!(!past_boundary.needs_refresh(now));
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        let creds = session_expiring_at(None);
        assert!(creds.needs_refresh(Utc::now()));
    }

    #[test]
    fn missing_refresh_token_is_written_as_null() {
        let mut creds = session_expiring_at(None);
        creds.refresh_token = None;
        let json = serde_json::to_value(&creds).unwrap();
        assert!(json.as_object().unwrap().contains_key("refreshToken"));
        assert!(json["refreshToken"].is_null());
        assert_eq!(json["kind"], "session");
        assert!(!creds.can_refresh());
    }

    #[test]
    fn refresh_keeps_unrotated_refresh_token() {
        let now = Utc::now();
        let mut creds = session_expiring_at(Some(now));
        creds.apply_refresh(
            TokenGrant {
                access_token: "new-access".to_string(),
                expires_at: Some(now + TimeDelta::hours(1)),
                refresh_token: None,
                user: None,
            },
            now,
        );
        assert_eq!(creds.access_token, "new-access");
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh"));
        assert!(!creds.needs_refresh(now));
    }

    #[test]
    fn debug_redacts_tokens() {
        let creds = session_expiring_at(None);
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("access\""));
        assert!(rendered.contains("<redacted>"));
    }
}
