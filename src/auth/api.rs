//! HTTP calls to the authentication endpoints.
//!
//! The backend is inconsistent about field naming (`deviceCode` vs
//! `device_code`), so each endpoint has exactly one `decode_*` function that
//! turns the raw JSON body into a canonical struct. Nothing past this module
//! looks at raw response field names.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::auth::credentials::UserInfo;
use crate::error::AuthError;

/// Device-flow start endpoint.
pub const DEVICE_START_PATH: &str = "/api/auth/device/start";
/// Device-flow poll endpoint.
pub const DEVICE_POLL_PATH: &str = "/api/auth/device/poll";
/// Session refresh endpoint.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Timeout for each individual auth request.
pub const AUTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest token lifetime taken from `expiresIn` (ten years).
const MAX_GRANT_LIFETIME_SECS: i64 = 10 * 366 * 24 * 60 * 60;

/// A freshly issued access token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Bearer token.
    pub access_token: String,
    /// Expiry, if the server reported one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token, if the server issued one.
    pub refresh_token: Option<String>,
    /// Signed-in user, if reported.
    pub user: Option<UserInfo>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Canonical device-flow start response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeResponse {
    /// Opaque code sent to the poll endpoint. Never shown to the user.
    pub device_code: String,
    /// Code the user confirms in the browser.
    pub user_code: String,
    /// Page where the user approves the request.
    pub verification_url: String,
    /// Lifetime of the device code in seconds.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

/// Canonical device-flow poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// The user has not acted yet.
    Pending,
    /// The user approved; the grant carries the session tokens.
    Approved(TokenGrant),
    /// The user rejected the request.
    Denied,
    /// The device code is no longer valid.
    Expired,
}

/// Client for the authentication endpoints of one API base URL.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    /// Creates a client for `base_url` sharing the given HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The API base URL, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a client for a different base URL sharing the connection pool.
    #[must_use]
    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self::new(self.http.clone(), base_url)
    }

    /// Starts a device-authorization session.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx statuses and responses missing any
    /// required field.
    pub async fn start_device_flow(&self) -> Result<DeviceCodeResponse, AuthError> {
        let (status, body) = self.post_json(DEVICE_START_PATH, json!({})).await?;
        if !status.is_success() {
            return Err(AuthError::Status {
                endpoint: DEVICE_START_PATH,
                status: status.as_u16(),
            });
        }
        decode_device_start(&body)
    }

    /// Polls the device-authorization session once.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, unrecognised statuses, and an `approved`
    /// status without an access token.
    pub async fn poll_device_flow(&self, device_code: &str) -> Result<PollResponse, AuthError> {
        let (status, body) = self
            .post_json(DEVICE_POLL_PATH, json!({ "deviceCode": device_code }))
            .await?;

        // Some deployments answer pending/denied with 4xx but still carry a status.
        if !status.is_success() && status_field(&body).is_none() {
            return Err(AuthError::Status {
                endpoint: DEVICE_POLL_PATH,
                status: status.as_u16(),
            });
        }
        decode_device_poll(&body, Utc::now())
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx statuses and responses without an
    /// access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let (status, body) = self
            .post_json(REFRESH_PATH, json!({ "refreshToken": refresh_token }))
            .await?;
        if !status.is_success() {
            return Err(AuthError::Status {
                endpoint: REFRESH_PATH,
                status: status.as_u16(),
            });
        }
        decode_token_grant(REFRESH_PATH, &body, Utc::now())
    }

    async fn post_json(
        &self,
        endpoint: &'static str,
        body: Value,
    ) -> Result<(reqwest::StatusCode, Value), AuthError> {
        let url = format!("{}{endpoint}", self.base_url);
        tracing::debug!(%url, "Calling auth endpoint");

        let response = self
            .http
            .post(&url)
            .timeout(AUTH_REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|source| AuthError::Transport { endpoint, source })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| AuthError::Transport { endpoint, source })?;

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        Ok((status, value))
    }
}

/// Looks up a field by any of its accepted spellings.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n)).filter(|v| !v.is_null())
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_field(obj: &Map<String, Value>, names: &[&str]) -> Option<u64> {
    match field(obj, names)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn status_field(body: &Value) -> Option<String> {
    body.as_object()
        .and_then(|obj| string_field(obj, &["status"]))
        .map(|s| s.to_ascii_lowercase())
}

/// Parses an expiry given as RFC 3339 text or epoch seconds/milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(epoch_to_datetime)),
        Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    // Anything past year 5138 in seconds is really milliseconds.
    if raw > 100_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

fn decode_user(obj: &Map<String, Value>) -> Option<UserInfo> {
    let user = field(obj, &["user"])?.as_object()?;
    let id = match field(user, &["id", "userId", "user_id"]) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Some(UserInfo {
        id,
        email: string_field(user, &["email"]),
    })
}

/// Decodes a start response, failing closed on any missing field.
///
/// # Errors
///
/// Returns `MalformedResponse` naming the first missing field.
pub fn decode_device_start(body: &Value) -> Result<DeviceCodeResponse, AuthError> {
    let malformed = |message: String| AuthError::MalformedResponse {
        endpoint: DEVICE_START_PATH,
        message,
    };
    let obj = body
        .as_object()
        .ok_or_else(|| malformed("response is not a JSON object".to_string()))?;
    let missing = |name: &str| malformed(format!("missing {name}"));

    Ok(DeviceCodeResponse {
        device_code: string_field(obj, &["deviceCode", "device_code"])
            .ok_or_else(|| missing("deviceCode"))?,
        user_code: string_field(obj, &["userCode", "user_code"])
            .ok_or_else(|| missing("userCode"))?,
        verification_url: string_field(
            obj,
            &[
                "verificationUrl",
                "verification_url",
                "verificationUri",
                "verification_uri",
            ],
        )
        .ok_or_else(|| missing("verificationUrl"))?,
        expires_in: u64_field(obj, &["expiresIn", "expires_in"])
            .ok_or_else(|| missing("expiresIn"))?,
        interval: u64_field(obj, &["interval"]).ok_or_else(|| missing("interval"))?,
    })
}

/// Decodes a poll response.
///
/// # Errors
///
/// `ProtocolViolation` for `approved` without an access token,
/// `MalformedResponse` for a missing or unknown status.
pub fn decode_device_poll(body: &Value, now: DateTime<Utc>) -> Result<PollResponse, AuthError> {
    let status = status_field(body).ok_or_else(|| AuthError::MalformedResponse {
        endpoint: DEVICE_POLL_PATH,
        message: "missing status".to_string(),
    })?;

    match status.as_str() {
        "pending" | "authorization_pending" | "slow_down" => Ok(PollResponse::Pending),
        "denied" | "access_denied" => Ok(PollResponse::Denied),
        "expired" | "expired_token" => Ok(PollResponse::Expired),
        "approved" => match decode_token_grant(DEVICE_POLL_PATH, body, now) {
            Ok(grant) => Ok(PollResponse::Approved(grant)),
            Err(_) => Err(AuthError::ProtocolViolation(
                "approved response carried no access token".to_string(),
            )),
        },
        other => Err(AuthError::MalformedResponse {
            endpoint: DEVICE_POLL_PATH,
            message: format!("unknown status '{other}'"),
        }),
    }
}

/// Decodes the token-carrying part of a poll or refresh response.
///
/// # Errors
///
/// Returns `MalformedResponse` when no access token is present.
pub fn decode_token_grant(
    endpoint: &'static str,
    body: &Value,
    now: DateTime<Utc>,
) -> Result<TokenGrant, AuthError> {
    let obj = body.as_object().ok_or_else(|| AuthError::MalformedResponse {
        endpoint,
        message: "response is not a JSON object".to_string(),
    })?;

    let access_token = string_field(obj, &["accessToken", "access_token"]).ok_or_else(|| {
        AuthError::MalformedResponse {
            endpoint,
            message: "missing accessToken".to_string(),
        }
    })?;

    let expires_at = field(obj, &["expiresAt", "expires_at"])
        .and_then(parse_timestamp)
        .or_else(|| {
            u64_field(obj, &["expiresIn", "expires_in"])
                .map(|secs| {
                    i64::try_from(secs)
                        .unwrap_or(i64::MAX)
                        .min(MAX_GRANT_LIFETIME_SECS)
                })
                .and_then(TimeDelta::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
        });

    Ok(TokenGrant {
        access_token,
        expires_at,
        refresh_token: string_field(obj, &["refreshToken", "refresh_token"]),
        user: decode_user(obj),
    })
}
