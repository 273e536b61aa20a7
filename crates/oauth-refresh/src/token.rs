//! Refresh-token grant
//!
//! POSTs `grant_type=refresh_token` to the configured token endpoint and
//! turns the response into a new `Credential`. Servers that don't rotate
//! refresh tokens omit `refresh_token` from the response; the previous one
//! is kept in that case.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use common::Secret;
use reauth::{AuthClient, BoxError, Credential, OutgoingRequest, Reauthenticate, RefreshConfig};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{FORM_CONTENT_TYPE, GRANT_TYPE_REFRESH, JSON_CONTENT_TYPE};
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Reauthenticates by exchanging the stored refresh token.
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    token_url: String,
    client_id: String,
    scope: Option<String>,
}

impl RefreshGrant {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
        }
    }

    /// Exchange `refresh` for a new token pair.
    ///
    /// Sent without the API credential header and without reauthentication:
    /// a 401 from the token endpoint is an error here, never a nested
    /// reauthentication.
    pub async fn refresh(&self, client: &AuthClient, refresh: &Secret<String>) -> Result<TokenResponse> {
        let mut form = vec![
            ("grant_type", GRANT_TYPE_REFRESH),
            ("refresh_token", refresh.expose().as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }
        let body = serde_urlencoded::to_string(&form).map_err(|e| Error::Encode(e.to_string()))?;

        let request = OutgoingRequest::post(&self.token_url)
            .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
            .header(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE))
            .body(body);

        debug!(token_url = %self.token_url, "requesting token refresh");
        let response = client
            .execute_without_credentials(request)
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text();

            // 401/403 means the refresh token is revoked or invalid
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(Error::InvalidCredentials(format!(
                    "refresh token rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        serde_json::from_slice::<TokenResponse>(response.body())
            .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
    }
}

impl Reauthenticate for RefreshGrant {
    fn reauthenticate<'a>(
        &'a self,
        client: &'a AuthClient,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Credential, BoxError>> + Send + 'a>> {
        Box::pin(async move {
            let current = client.snapshot().await;
            if current.refresh_token.is_blank() {
                return Err(BoxError::from(Error::InvalidCredentials(
                    "no refresh token available".into(),
                )));
            }

            let token = self.refresh(client, &current.refresh_token).await?;
            let rotated = token.refresh_token.is_some();
            let refresh = token
                .refresh_token
                .unwrap_or_else(|| current.refresh_token.expose().clone());
            info!(
                expires_in = ?token.expires_in,
                rotated,
                "refresh grant succeeded"
            );
            Ok::<Credential, BoxError>(Credential::new(token.access_token, refresh))
        })
    }
}
