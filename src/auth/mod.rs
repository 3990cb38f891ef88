//! Authentication: stored sessions, the device flow and token resolution.
//!
//! # Architecture
//!
//! ```text
//!   device flow ──approve──▶ CredentialStore ◀──refresh── TokenResolver
//!   (login CLI)              (credentials.json)            (every proxied call)
//! ```
//!
//! # Security
//!
//! - Tokens are never logged; `Debug` impls redact them
//! - The credentials file is owner read/write only
//! - Only interactive sessions are persisted; environment tokens stay in memory

pub mod api;
pub mod credentials;
pub mod device;
pub mod token;

pub use api::{AuthApi, PollResponse, TokenGrant};
pub use credentials::{CredentialKind, Credentials, UserInfo, REFRESH_WINDOW_SECS};
pub use device::{DeviceAuthorization, DeviceFlow};
pub use token::{AccessToken, AuthStatus, TokenResolver, TokenSourceKind, TokenStrategy};
