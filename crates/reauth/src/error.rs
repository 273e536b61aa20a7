//! Error types and classification for authenticated requests
//!
//! Every failure `AuthClient::execute` can return maps onto one `ErrorKind`,
//! so callers branch on the kind instead of matching message text.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

/// Boxed error returned by reauthentication strategies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A reauthentication failure shared between the initiator and every waiter.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Closed set of failure kinds surfaced by the request core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The network call itself failed. Never triggers reauthentication.
    TransportFailure,
    /// Plain 401: no reauthenticator configured, or a throwaway request.
    AuthenticationFailure,
    /// The reauthenticator returned an error (or timed out).
    UnableToReauthenticate,
    /// Reauthentication succeeded but the resent request was still rejected.
    ErrorAfterReauthentication,
    /// The caller's cancellation token or deadline fired.
    Cancelled,
    /// Header or URL could not be built; nothing was sent.
    InvalidRequest,
}

/// Why a call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    DeadlineExceeded,
}

/// Errors from authenticated request execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("authentication failed ({status}): {body}")]
    AuthenticationFailure { status: StatusCode, body: String },

    #[error("unable to re-authenticate: {0}")]
    UnableToReauthenticate(#[source] SharedError),

    #[error("successfully re-authenticated, but got error executing request: {status}: {body}")]
    ErrorAfterReauthentication { status: StatusCode, body: String },

    #[error("cancelled: {0:?}")]
    Cancelled(CancelReason),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// The failure kind, for branching without inspecting strings.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::TransportFailure,
            Error::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            Error::UnableToReauthenticate(_) => ErrorKind::UnableToReauthenticate,
            Error::ErrorAfterReauthentication { .. } => ErrorKind::ErrorAfterReauthentication,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// True when new credentials are needed before retrying makes sense.
    pub fn needs_credentials(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthenticationFailure
                | ErrorKind::UnableToReauthenticate
                | ErrorKind::ErrorAfterReauthentication
        )
    }
}

/// Map a response status to a failure kind, if it is one the core handles.
pub fn classify_status(status: StatusCode) -> Option<ErrorKind> {
    if status == StatusCode::UNAUTHORIZED {
        Some(ErrorKind::AuthenticationFailure)
    } else {
        None
    }
}

/// Error recorded when a reauthentication job exceeds the configured timeout.
#[derive(Debug, thiserror::Error)]
#[error("reauthentication timed out after {0:?}")]
pub struct ReauthTimedOut(pub Duration);

/// Error recorded when a reauthentication job ends without producing a result.
#[derive(Debug, thiserror::Error)]
#[error("reauthentication task aborted: {0}")]
pub struct ReauthAborted(pub String);

/// Result alias for request operations.
pub type Result<T> = std::result::Result<T, Error>;
