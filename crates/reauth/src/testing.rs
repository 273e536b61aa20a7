//! Test fixtures: an in-process upstream API and a counting reauthenticator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::client::{AuthClient, Reauthenticate};
use crate::credential::Credential;
use crate::error::BoxError;

#[derive(Clone)]
struct UpstreamState {
    valid_token: &'static str,
    always_reject: bool,
    hits: Arc<AtomicUsize>,
}

/// Handle to a running fake upstream.
pub struct Upstream {
    base: String,
    hits: Arc<AtomicUsize>,
    _task: tokio::task::JoinHandle<()>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Requests received on `/resource`.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start an upstream that accepts `Bearer <valid_token>` on `/resource`
/// (or rejects everything when `always_reject`).
///
/// Routes:
/// - `/resource` (GET/POST): 200 echoing the request body, or 401
/// - `/missing`: 404
/// - `/slow`: 200 after two seconds
/// - `/echo`: `<authorization>|<x-auth-token>` as received
pub async fn start_upstream(valid_token: &'static str, always_reject: bool) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = UpstreamState {
        valid_token,
        always_reject,
        hits: hits.clone(),
    };

    let app = Router::new()
        .route("/resource", get(resource).post(resource))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "no such volume") }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        )
        .route("/echo", get(echo))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        base: format!("http://{addr}"),
        hits,
        _task: task,
    }
}

async fn resource(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let expected = format!("Bearer {}", state.valid_token);
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.always_reject && presented == expected {
        (StatusCode::OK, body)
    } else {
        (StatusCode::UNAUTHORIZED, "invalid token".to_string())
    }
}

async fn echo(headers: HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    format!("{}|{}", header("authorization"), header("x-auth-token"))
}

/// Reauthenticator fake: counts calls, optionally waits, then issues a token
/// or fails.
pub struct CountingReauth {
    pub calls: Arc<AtomicUsize>,
    issue: &'static str,
    failure: Option<&'static str>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
}

impl CountingReauth {
    pub fn issuing(access_token: &'static str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            issue: access_token,
            failure: None,
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn failing(message: &'static str) -> Self {
        Self {
            failure: Some(message),
            ..Self::issuing("unused")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block each call until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Reauthenticate for CountingReauth {
    fn reauthenticate<'a>(
        &'a self,
        _client: &'a AuthClient,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, BoxError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            tokio::time::sleep(self.delay).await;
            match self.failure {
                Some(message) => Err(BoxError::from(message)),
                None => Ok(Credential::new(self.issue, "rt_refreshed")),
            }
        })
    }
}
