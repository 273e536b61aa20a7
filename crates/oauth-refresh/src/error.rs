//! Error types for refresh grant operations

/// Errors from the refresh grant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("could not encode token request: {0}")]
    Encode(String),
}

/// Result alias for refresh operations.
pub type Result<T> = std::result::Result<T, Error>;
