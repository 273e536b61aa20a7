//! Credential header construction
//!
//! Exactly one auth header is set per request, replacing whatever the caller
//! supplied under the same name. The default is `Authorization: Bearer <token>`;
//! APIs that expect a bare token in a custom header (e.g. `X-Auth-Token`) use
//! `HeaderScheme::new(name, None)`.

use std::str::FromStr;

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};

/// Header name plus optional scheme prefix for the access token.
#[derive(Debug, Clone)]
pub struct HeaderScheme {
    name: HeaderName,
    prefix: Option<String>,
}

impl Default for HeaderScheme {
    fn default() -> Self {
        Self::bearer()
    }
}

impl HeaderScheme {
    /// `Authorization: Bearer <token>`
    pub fn bearer() -> Self {
        Self {
            name: AUTHORIZATION,
            prefix: Some("Bearer".to_string()),
        }
    }

    /// Custom header; an empty or missing prefix sends the raw token.
    pub fn new(name: &str, prefix: Option<&str>) -> Result<Self> {
        let name = HeaderName::from_str(name)
            .map_err(|e| Error::InvalidRequest(format!("invalid auth header name {name:?}: {e}")))?;
        let prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        Ok(Self { name, prefix })
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Header value for `token`, marked sensitive so it is redacted in debug output.
    pub fn value_for(&self, token: &Secret<String>) -> Result<HeaderValue> {
        let raw = match &self.prefix {
            Some(prefix) => format!("{prefix} {}", token.expose()),
            None => token.expose().clone(),
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|_| {
            Error::InvalidRequest(format!(
                "access token is not a valid {} header value",
                self.name
            ))
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Set the auth header on `headers`, replacing every existing value.
    pub fn apply(&self, headers: &mut HeaderMap, token: &Secret<String>) -> Result<()> {
        let value = self.value_for(token)?;
        headers.insert(self.name.clone(), value);
        Ok(())
    }
}
