//! OAuth2 device-authorization flow.
//!
//! The flow is driven by the caller rather than by callbacks:
//!
//! 1. [`DeviceFlow::start`] returns a [`DeviceAuthorization`] describing what
//!    to show the user.
//! 2. The caller presents [`DeviceAuthorization::display_url`] and the user
//!    code however it likes ([`open_browser`] and [`copy_to_clipboard`] are
//!    available as best-effort helpers).
//! 3. [`DeviceFlow::wait`] polls until a terminal state and persists the
//!    session on approval. It is an ordinary future: drop it to cancel.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::auth::api::{AuthApi, DeviceCodeResponse, PollResponse};
use crate::auth::credentials::Credentials;
use crate::error::AuthError;
use crate::store::CredentialStore;

/// Lower bound on the poll interval, whatever the server asks for.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a session's lifetime and poll interval.
pub const MAX_DEVICE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// A started device-authorization session in the `pending` state.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    device_code: String,
    /// Code the user confirms in the browser.
    pub user_code: String,
    /// Verification page as returned by the server.
    pub verification_url: String,
    /// Lifetime of the session.
    pub expires_in: Duration,
    /// Server-requested delay between polls.
    pub interval: Duration,
    started_at: Instant,
}

impl DeviceAuthorization {
    /// Wraps a start response; the deadline counts from `started_at`.
    #[must_use]
    pub fn new(response: DeviceCodeResponse, started_at: Instant) -> Self {
        Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_url: response.verification_url,
            expires_in: Duration::from_secs(response.expires_in).min(MAX_DEVICE_LIFETIME),
            interval: Duration::from_secs(response.interval).min(MAX_DEVICE_LIFETIME),
            started_at,
        }
    }

    /// Instant after which polling stops with a timeout.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started_at
            .checked_add(self.expires_in)
            .unwrap_or(self.started_at)
    }

    /// Effective delay between polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }

    /// Builds the URL to show the user.
    ///
    /// The origin is replaced with `frontend_origin` when one is configured,
    /// and the user code is appended as a path segment unless the URL
    /// already carries a `code` query parameter.
    #[must_use]
    pub fn display_url(&self, frontend_origin: Option<&str>) -> String {
        let Ok(mut target) = url::Url::parse(&self.verification_url) else {
            return format!(
                "{}/{}",
                self.verification_url.trim_end_matches('/'),
                self.user_code
            );
        };

        if let Some(origin) = frontend_origin.and_then(|o| url::Url::parse(o).ok()) {
            let mut rebased = origin;
            rebased.set_path(target.path());
            rebased.set_query(target.query());
            rebased.set_fragment(target.fragment());
            target = rebased;
        }

        let has_code = target.query_pairs().any(|(k, _)| k == "code");
        if !has_code {
            if let Ok(mut segments) = target.path_segments_mut() {
                segments.pop_if_empty().push(&self.user_code);
            }
        }

        target.to_string()
    }
}

/// Runs device-authorization sessions against one API base URL.
#[derive(Debug, Clone)]
pub struct DeviceFlow {
    api: AuthApi,
    credentials: CredentialStore,
}

impl DeviceFlow {
    /// Creates a flow that persists approved sessions into `credentials`.
    #[must_use]
    pub const fn new(api: AuthApi, credentials: CredentialStore) -> Self {
        Self { api, credentials }
    }

    /// Starts a new session.
    ///
    /// # Errors
    ///
    /// Fails if the start endpoint is unreachable or its response lacks a
    /// required field.
    pub async fn start(&self) -> Result<DeviceAuthorization, AuthError> {
        let started_at = Instant::now();
        let response = self.api.start_device_flow().await?;
        tracing::info!(
            expires_in = response.expires_in,
            interval = response.interval,
            "Device authorization started"
        );
        Ok(DeviceAuthorization::new(response, started_at))
    }

    /// Polls the session once without waiting.
    ///
    /// # Errors
    ///
    /// See [`AuthApi::poll_device_flow`].
    pub async fn poll_once(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<PollResponse, AuthError> {
        self.api
            .poll_device_flow(&authorization.device_code)
            .await
    }

    /// Polls until the session reaches a terminal state.
    ///
    /// On approval the session is written to the credential store and
    /// returned. Transient failures are retried at the normal interval.
    ///
    /// # Errors
    ///
    /// - `DeviceFlowDenied` / `DeviceFlowExpired` when the server says so
    /// - `DeviceFlowTimedOut` when the local deadline passes first
    /// - `ProtocolViolation` for an approval without an access token
    /// - `Store` if the credentials cannot be written
    pub async fn wait(&self, authorization: &DeviceAuthorization) -> Result<Credentials, AuthError> {
        let interval = authorization.poll_interval();
        let deadline = authorization.deadline();

        loop {
            let next_poll = Instant::now() + interval;
            if next_poll > deadline {
                tokio::time::sleep_until(deadline).await;
                tracing::warn!("Device authorization deadline elapsed");
                return Err(AuthError::DeviceFlowTimedOut);
            }
            tokio::time::sleep_until(next_poll).await;

            match self.poll_once(authorization).await {
                Ok(PollResponse::Pending) => {
                    tracing::trace!("Device authorization still pending");
                }
                Ok(PollResponse::Approved(grant)) => {
                    let credentials = Credentials::from_grant(self.api.base_url(), grant, Utc::now());
                    self.credentials.save_async(credentials.clone()).await?;
                    tracing::info!(
                        user = credentials.user_email().unwrap_or("<unknown>"),
                        refreshable = credentials.can_refresh(),
                        "Device authorization approved"
                    );
                    return Ok(credentials);
                }
                Ok(PollResponse::Denied) => return Err(AuthError::DeviceFlowDenied),
                Ok(PollResponse::Expired) => return Err(AuthError::DeviceFlowExpired),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Device poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Tries to open `url` in the default browser. Failures are only logged.
pub fn open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn();
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open").arg(url).spawn();

    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Could not open browser");
            false
        }
    }
}

/// Tries to copy `text` to the system clipboard. Failures are only logged.
pub fn copy_to_clipboard(text: &str) -> bool {
    match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_string())) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Could not copy to clipboard");
            false
        }
    }
}
