//! Authenticated request core
//!
//! Attaches bearer credentials to outgoing HTTP requests, detects 401
//! rejections, and coordinates reauthentication across concurrent requests
//! so that one stale credential produces exactly one refresh. Resource
//! wrappers (list/get/create/...) funnel every call through
//! `AuthClient::execute` and never handle auth headers themselves.
//!
//! Components:
//! 1. `CredentialState` holds the token pair and a generation counter
//! 2. `ReauthCoordinator` runs at most one reauthentication at a time
//! 3. `AuthClient` sends requests and resends once after a refresh
//! 4. `Error::kind` classifies terminal failures
//!
//! How new tokens are obtained is pluggable through `Reauthenticate`.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod metrics;
pub mod request;
pub mod scheme;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{AuthClient, AuthClientBuilder, FnReauthenticator, Reauthenticate, reauth_fn};
pub use config::{ClientConfig, RefreshConfig};
pub use coordinator::ReauthCoordinator;
pub use credential::{Credential, CredentialState};
pub use error::{BoxError, CancelReason, Error, ErrorKind, Result, classify_status};
pub use request::{OutgoingRequest, Response};
pub use scheme::HeaderScheme;

pub use tokio_util::sync::CancellationToken;
