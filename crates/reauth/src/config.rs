//! Client configuration types and loading
//!
//! Config precedence: explicit path > CONFIG_PATH env var > default file name.
//! Tokens are never read from the TOML itself: the access token comes from
//! API_ACCESS_TOKEN or `access_token_file`, the refresh token from
//! API_REFRESH_TOKEN or `refresh_token_file`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use common::Secret;
use reqwest::header::HeaderName;
use serde::Deserialize;

use crate::credential::Credential;
use crate::error::Result;
use crate::scheme::HeaderScheme;

pub const ACCESS_TOKEN_ENV: &str = "API_ACCESS_TOKEN";
pub const REFRESH_TOKEN_ENV: &str = "API_REFRESH_TOKEN";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Present when the OAuth refresh grant should be used to reauthenticate
    #[serde(default)]
    pub refresh: Option<RefreshConfig>,
    #[serde(default)]
    pub tokens: TokenSources,
}

/// Credential header and reauthentication settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_header")]
    pub header: String,
    /// Prefix before the token; empty sends the raw token
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_reauth_timeout")]
    pub reauth_timeout_secs: u64,
}

/// Transport settings
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// OAuth 2.0 token endpoint used for the refresh grant
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub token_url: String,
    pub client_id: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Files holding the initial tokens (env vars take precedence)
#[derive(Debug, Default, Deserialize)]
pub struct TokenSources {
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
    #[serde(default)]
    pub refresh_token_file: Option<PathBuf>,
}

fn default_header() -> String {
    "authorization".to_string()
}

fn default_scheme() -> String {
    "Bearer".to_string()
}

fn default_reauth_timeout() -> u64 {
    30
}

fn default_timeout() -> u64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_header(),
            scheme: default_scheme(),
            reauth_timeout_secs: default_reauth_timeout(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let config: ClientConfig = toml::from_str(contents)?;

        if HeaderName::from_str(&config.auth.header).is_err() {
            return Err(common::Error::Config(format!(
                "auth.header is not a valid header name: {:?}",
                config.auth.header
            )));
        }

        // An unbounded refresh would stall every waiter
        if config.auth.reauth_timeout_secs == 0 {
            return Err(common::Error::Config(
                "reauth_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.http.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref refresh) = config.refresh {
            if !refresh.token_url.starts_with("http://")
                && !refresh.token_url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "token_url must start with http:// or https://, got: {}",
                    refresh.token_url
                )));
            }
            if refresh.client_id.trim().is_empty() {
                return Err(common::Error::Config("client_id must not be empty".into()));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-client.toml")
    }

    pub fn header_scheme(&self) -> Result<HeaderScheme> {
        HeaderScheme::new(&self.auth.header, Some(&self.auth.scheme))
    }

    pub fn reauth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.reauth_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Resolve the initial credential from the environment or token files.
    ///
    /// The access token is required; a missing refresh token yields an empty
    /// one (reauthenticators that don't use it can ignore it).
    pub fn initial_credential(&self) -> common::Result<Credential> {
        let access = resolve_token(ACCESS_TOKEN_ENV, self.tokens.access_token_file.as_deref())?
            .ok_or(common::Error::MissingToken {
                var: ACCESS_TOKEN_ENV,
                file_key: "access_token_file",
            })?;
        let refresh = resolve_token(REFRESH_TOKEN_ENV, self.tokens.refresh_token_file.as_deref())?
            .unwrap_or_else(|| Secret::new(String::new()));
        Ok(Credential::new(access, refresh))
    }
}

/// Env var first, then file; blank values count as absent.
fn resolve_token(var: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(var) {
        let token = Secret::new(value.trim().to_owned());
        if !token.is_blank() {
            return Ok(Some(token));
        }
    }
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            common::Error::Config(format!("failed to read token file {}: {e}", path.display()))
        })?;
        let token = Secret::new(contents.trim().to_owned());
        if !token.is_blank() {
            return Ok(Some(token));
        }
    }
    Ok(None)
}
