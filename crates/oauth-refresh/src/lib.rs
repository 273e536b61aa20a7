//! OAuth 2.0 refresh-token reauthentication
//!
//! Provides `RefreshGrant`, a `reauth::Reauthenticate` strategy that trades
//! the client's refresh token for a new access token at a token endpoint.
//! The token call is sent without the API credential header and never
//! reauthenticates, so a rejected refresh surfaces as an error instead of
//! recursing into another refresh.
//!
//! Typical wiring:
//! 1. `ClientConfig::load()` with a `[refresh]` section
//! 2. `RefreshGrant::from_config(&config.refresh)`
//! 3. `AuthClient::builder(credential).reauthenticator(grant)`

pub mod constants;
pub mod error;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use token::{RefreshGrant, TokenResponse};
