//! Single-flight reauthentication
//!
//! When a request is rejected with 401, its caller asks the coordinator to
//! make the credential fresh again. Only one reauthentication runs at a time:
//! the first caller starts a session, later callers subscribe to the same
//! session's `watch` channel and receive its outcome. A caller whose observed
//! generation is already behind the stored one returns immediately, since a
//! refresh completed after it read the credential.
//!
//! The reauthentication job runs on its own task, outside the coordination
//! lock. Dropping or cancelling any caller (including the one that started
//! the session) never strands the session or the other waiters.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialState};
use crate::error::{
    BoxError, CancelReason, Error, ReauthAborted, ReauthTimedOut, Result, SharedError,
};
use crate::metrics;

type Outcome = std::result::Result<u64, SharedError>;

/// One in-progress reauthentication.
struct ReauthSession {
    started_generation: u64,
    done: watch::Receiver<Option<Outcome>>,
}

impl ReauthSession {
    /// False once the session task is gone without having cleared its slot,
    /// e.g. when the runtime that spawned it shut down.
    fn is_live(&self) -> bool {
        self.done.has_changed().is_ok()
    }
}

struct Inner {
    credentials: Arc<CredentialState>,
    active: Mutex<Option<ReauthSession>>,
    reauthenticating: AtomicBool,
    reauth_timeout: Option<Duration>,
}

/// Coordinates reauthentication for one `CredentialState`.
///
/// Cheap to clone; clones share the same session slot.
#[derive(Clone)]
pub struct ReauthCoordinator {
    inner: Arc<Inner>,
}

impl ReauthCoordinator {
    /// `reauth_timeout` bounds each reauthentication job; `None` waits forever.
    pub fn new(credentials: Arc<CredentialState>, reauth_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials,
                active: Mutex::new(None),
                reauthenticating: AtomicBool::new(false),
                reauth_timeout,
            }),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialState> {
        &self.inner.credentials
    }

    /// True while a reauthentication session is running.
    pub fn is_reauthenticating(&self) -> bool {
        self.inner.reauthenticating.load(Ordering::Acquire)
    }

    /// Make sure the credential is newer than `observed_generation`.
    ///
    /// Returns `Ok(())` without calling `reauth` if another refresh already
    /// replaced the credential, joins the running session if there is one,
    /// and otherwise starts a session that runs `reauth` exactly once.
    ///
    /// Failures of `reauth` come back as `UnableToReauthenticate` to the
    /// initiator and to every waiter. If `cancel` fires first, this caller
    /// gets `Cancelled` and the session carries on for the others.
    pub async fn ensure_fresh<F, Fut>(
        &self,
        observed_generation: u64,
        reauth: F,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Credential, BoxError>> + Send + 'static,
    {
        let mut done = {
            let mut active = self.inner.active.lock().await;

            let current = self.inner.credentials.current_generation();
            if current != observed_generation {
                debug!(
                    observed_generation,
                    current, "credential already refreshed, skipping reauthentication"
                );
                return Ok(());
            }

            if active.as_ref().is_some_and(|session| !session.is_live()) {
                warn!("discarding reauthentication session whose task ended without a result");
                *active = None;
            }

            match active.as_ref() {
                Some(session) => {
                    debug!(
                        started_generation = session.started_generation,
                        "joining in-flight reauthentication"
                    );
                    metrics::record_waiter();
                    session.done.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *active = Some(ReauthSession {
                        started_generation: observed_generation,
                        done: rx.clone(),
                    });
                    self.inner.reauthenticating.store(true, Ordering::Release);
                    info!(generation = observed_generation, "starting reauthentication");
                    let guard = SessionGuard {
                        inner: self.inner.clone(),
                        done: tx,
                        published: false,
                    };
                    tokio::spawn(run_session(guard, reauth));
                    rx
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled while waiting for reauthentication");
                Err(Error::Cancelled(CancelReason::Requested))
            }
            outcome = wait_outcome(&mut done) => outcome,
        }
    }
}

impl std::fmt::Debug for ReauthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthCoordinator")
            .field("generation", &self.inner.credentials.current_generation())
            .field("reauthenticating", &self.is_reauthenticating())
            .field("reauth_timeout", &self.inner.reauth_timeout)
            .finish()
    }
}

/// Block until the session publishes its outcome.
async fn wait_outcome(done: &mut watch::Receiver<Option<Outcome>>) -> Result<()> {
    let outcome = match done.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        // Sender dropped without publishing
        Err(_) => None,
    };

    match outcome {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(Error::UnableToReauthenticate(e)),
        None => Err(Error::UnableToReauthenticate(Arc::new(ReauthAborted(
            "session ended without a result".into(),
        )))),
    }
}

/// Owned by the session task. Publishes the outcome; if the task is dropped
/// before that, clears the running flag and closes the channel so the next
/// caller replaces the dead session.
struct SessionGuard {
    inner: Arc<Inner>,
    done: watch::Sender<Option<Outcome>>,
    published: bool,
}

impl SessionGuard {
    fn publish(mut self, outcome: Outcome) {
        self.published = true;
        self.done.send_replace(Some(outcome));
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.published {
            warn!("reauthentication task dropped before publishing a result");
            self.inner.reauthenticating.store(false, Ordering::Release);
        }
    }
}

/// Run the job, store its credential, clear the session, wake every waiter.
async fn run_session<F, Fut>(guard: SessionGuard, reauth: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<Credential, BoxError>> + Send + 'static,
{
    let inner = guard.inner.clone();
    let mut attempt = tokio::spawn(reauth());
    let result = match inner.reauth_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut attempt).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                attempt.abort();
                Err(Arc::new(ReauthTimedOut(limit)) as SharedError)
            }
        },
        None => flatten(attempt.await),
    };

    let mut active = inner.active.lock().await;
    let outcome = match result {
        Ok(credential) => {
            let generation = inner.credentials.replace(credential).await;
            info!(generation, "reauthentication succeeded");
            metrics::record_reauth(true);
            Ok(generation)
        }
        Err(e) => {
            warn!(error = %e, "reauthentication failed");
            metrics::record_reauth(false);
            Err(e)
        }
    };
    *active = None;
    inner.reauthenticating.store(false, Ordering::Release);
    guard.publish(outcome);
}

fn flatten(
    joined: std::result::Result<std::result::Result<Credential, BoxError>, JoinError>,
) -> std::result::Result<Credential, SharedError> {
    match joined {
        Ok(Ok(credential)) => Ok(credential),
        Ok(Err(e)) => Err(Arc::from(e)),
        Err(e) => Err(Arc::new(ReauthAborted(e.to_string())) as SharedError),
    }
}
