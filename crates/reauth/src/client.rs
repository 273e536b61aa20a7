//! Authenticated request execution
//!
//! `AuthClient` is the single entry point resource wrappers use: it attaches
//! the current access token, sends the request, and on a 401 coordinates one
//! reauthentication before resending exactly once.
//!
//! Request flow:
//! 1. Snapshot the credential and set the auth header
//! 2. Send; transport failures are returned immediately
//! 3. 401 on a normal handle with a reauthenticator configured →
//!    `ReauthCoordinator::ensure_fresh`, then resend once
//! 4. 401 again after a successful reauth → `ErrorAfterReauthentication`
//! 5. Anything else is returned as received
//!
//! The reauthenticator receives a *throwaway* handle to the same client. A
//! 401 on a throwaway request is returned as-is, so a refresh call that is
//! itself rejected can never trigger a nested reauthentication.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::coordinator::ReauthCoordinator;
use crate::credential::{Credential, CredentialState};
use crate::error::{BoxError, CancelReason, Error, ErrorKind, Result, classify_status};
use crate::metrics;
use crate::request::{OutgoingRequest, Response};
use crate::scheme::HeaderScheme;

/// Strategy that obtains a new credential when the current one is rejected.
///
/// `client` is a throwaway handle: requests sent through it carry the old
/// credential and never trigger reauthentication themselves.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Reauthenticate>`).
pub trait Reauthenticate: Send + Sync {
    fn reauthenticate<'a>(
        &'a self,
        client: &'a AuthClient,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Credential, BoxError>> + Send + 'a>>;
}

/// Adapter turning a closure into a `Reauthenticate` strategy.
pub struct FnReauthenticator<F>(F);

/// Wrap `f` as a reauthentication strategy. `f` gets an owned throwaway handle.
pub fn reauth_fn<F, Fut>(f: F) -> FnReauthenticator<F>
where
    F: Fn(AuthClient) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Credential, BoxError>> + Send + 'static,
{
    FnReauthenticator(f)
}

impl<F, Fut> Reauthenticate for FnReauthenticator<F>
where
    F: Fn(AuthClient) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Credential, BoxError>> + Send + 'static,
{
    fn reauthenticate<'a>(
        &'a self,
        client: &'a AuthClient,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Credential, BoxError>> + Send + 'a>> {
        Box::pin((self.0)(client.clone()))
    }
}

struct Shared {
    http: reqwest::Client,
    credentials: Arc<CredentialState>,
    coordinator: ReauthCoordinator,
    reauthenticator: Option<Arc<dyn Reauthenticate>>,
    scheme: HeaderScheme,
}

/// HTTP client that owns one credential pair and keeps it fresh.
///
/// Cheap to clone; clones share credentials and the reauthentication slot.
/// Separate `AuthClient::builder` calls produce fully independent clients.
#[derive(Clone)]
pub struct AuthClient {
    shared: Arc<Shared>,
    throwaway: bool,
}

impl AuthClient {
    pub fn builder(credential: Credential) -> AuthClientBuilder {
        AuthClientBuilder::new(credential)
    }

    /// Handle whose 401 responses are returned as-is, for use by reauthenticators.
    pub fn throwaway(&self) -> AuthClient {
        AuthClient {
            shared: self.shared.clone(),
            throwaway: true,
        }
    }

    pub fn is_throwaway(&self) -> bool {
        self.throwaway
    }

    pub fn is_reauthenticating(&self) -> bool {
        self.shared.coordinator.is_reauthenticating()
    }

    pub fn credentials(&self) -> &Arc<CredentialState> {
        &self.shared.credentials
    }

    /// Copy of the current credential.
    pub async fn snapshot(&self) -> Credential {
        self.shared.credentials.snapshot().await
    }

    /// The auth header for the current credential, for callers that build
    /// their own requests.
    pub async fn credential_headers(&self) -> Result<HeaderMap> {
        let credential = self.shared.credentials.snapshot().await;
        let mut headers = HeaderMap::new();
        self.shared
            .scheme
            .apply(&mut headers, &credential.access_token)?;
        Ok(headers)
    }

    /// Send `request` with automatic reauthentication.
    pub async fn execute(&self, request: OutgoingRequest) -> Result<Response> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like `execute`, returning `Cancelled` as soon as `cancel` fires.
    ///
    /// Cancelling never aborts a reauthentication other callers are waiting on.
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url(), throwaway = self.throwaway))]
    pub async fn execute_with_cancel(
        &self,
        request: OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        match request.call_deadline() {
            Some(limit) => tokio::time::timeout(limit, self.run(&request, cancel))
                .await
                .unwrap_or_else(|_| {
                    warn!(?limit, "request deadline exceeded");
                    Err(Error::Cancelled(CancelReason::DeadlineExceeded))
                }),
            None => self.run(&request, cancel).await,
        }
    }

    /// Send `request` without the credential header and without reauthentication.
    ///
    /// For reauthenticators talking to an identity service, which must not
    /// receive the API access token. Deadline and timeout apply as in `execute`.
    pub async fn execute_without_credentials(&self, request: OutgoingRequest) -> Result<Response> {
        let cancel = CancellationToken::new();
        let send = self.send(&request, None, &cancel);
        match request.call_deadline() {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .unwrap_or(Err(Error::Cancelled(CancelReason::DeadlineExceeded))),
            None => send.await,
        }
    }

    /// Reauthenticate now, unless a refresh already replaced `observed_generation`.
    pub async fn reauthenticate(
        &self,
        observed_generation: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(reauthenticator) = self.shared.reauthenticator.clone() else {
            return Err(Error::InvalidRequest(
                "no reauthenticator configured".into(),
            ));
        };
        let throwaway = self.throwaway();
        self.shared
            .coordinator
            .ensure_fresh(
                observed_generation,
                move || async move { reauthenticator.reauthenticate(&throwaway).await },
                cancel,
            )
            .await
    }

    async fn run(&self, request: &OutgoingRequest, cancel: &CancellationToken) -> Result<Response> {
        let credential = self.shared.credentials.snapshot().await;
        let response = self.send(request, Some(&credential), cancel).await?;

        if classify_status(response.status()) != Some(ErrorKind::AuthenticationFailure) {
            return Ok(response);
        }
        if self.throwaway {
            debug!("401 on throwaway request, returning it to the reauthenticator");
            return Ok(response);
        }
        if self.shared.reauthenticator.is_none() {
            debug!("401 with no reauthenticator configured");
            return Ok(response);
        }

        debug!(
            generation = credential.generation,
            "request rejected, reauthenticating"
        );
        self.reauthenticate(credential.generation, cancel).await?;

        let refreshed = self.shared.credentials.snapshot().await;
        let retried = self.send(request, Some(&refreshed), cancel).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            metrics::record_resend(true);
            warn!(
                generation = refreshed.generation,
                "request still rejected after reauthentication"
            );
            return Err(Error::ErrorAfterReauthentication {
                status: retried.status(),
                body: retried.text(),
            });
        }
        metrics::record_resend(false);
        Ok(retried)
    }

    async fn send(
        &self,
        request: &OutgoingRequest,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut headers = request.headers().clone();
        if let Some(credential) = credential {
            self.shared
                .scheme
                .apply(&mut headers, &credential.access_token)?;
        }

        let url = reqwest::Url::parse(request.url())
            .map_err(|e| Error::InvalidRequest(format!("invalid url {}: {e}", request.url())))?;

        let mut builder = self
            .shared
            .http
            .request(request.method().clone(), url)
            .headers(headers);
        if let Some(timeout) = request.transport_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        let exchange = async {
            let upstream = builder.send().await.map_err(|e| {
                warn!(error = %e, "transport failure");
                Error::Transport(e)
            })?;
            let status = upstream.status();
            let headers = upstream.headers().clone();
            let body = upstream.bytes().await.map_err(|e| {
                warn!(error = %e, "failed to read response body");
                Error::Transport(e)
            })?;
            Ok(Response::new(status, headers, body))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(CancelReason::Requested)),
            result = exchange => result,
        }
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("throwaway", &self.throwaway)
            .field("scheme", &self.shared.scheme)
            .field("coordinator", &self.shared.coordinator)
            .field("reauthenticator", &self.shared.reauthenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for `AuthClient`.
pub struct AuthClientBuilder {
    credential: Credential,
    http: Option<reqwest::Client>,
    reauthenticator: Option<Arc<dyn Reauthenticate>>,
    scheme: HeaderScheme,
    reauth_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl AuthClientBuilder {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            http: None,
            reauthenticator: None,
            scheme: HeaderScheme::default(),
            reauth_timeout: None,
            request_timeout: None,
        }
    }

    /// Apply header scheme and timeouts from a loaded config.
    pub fn with_config(mut self, config: &ClientConfig) -> Result<Self> {
        self.scheme = config.header_scheme()?;
        self.reauth_timeout = Some(config.reauth_timeout());
        self.request_timeout = Some(config.request_timeout());
        Ok(self)
    }

    pub fn reauthenticator(mut self, reauthenticator: impl Reauthenticate + 'static) -> Self {
        self.reauthenticator = Some(Arc::new(reauthenticator));
        self
    }

    pub fn header_scheme(mut self, scheme: HeaderScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Upper bound on a single reauthentication; unset waits indefinitely.
    pub fn reauth_timeout(mut self, timeout: Duration) -> Self {
        self.reauth_timeout = Some(timeout);
        self
    }

    /// Default per-send timeout for the internally built HTTP client.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Use an existing `reqwest::Client` (its own timeout settings apply).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<AuthClient> {
        let http = match self.http {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.request_timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(Error::Transport)?
            }
        };
        let credentials = Arc::new(CredentialState::new(self.credential));
        let coordinator = ReauthCoordinator::new(credentials.clone(), self.reauth_timeout);

        Ok(AuthClient {
            shared: Arc::new(Shared {
                http,
                credentials,
                coordinator,
                reauthenticator: self.reauthenticator,
                scheme: self.scheme,
            }),
            throwaway: false,
        })
    }
}
