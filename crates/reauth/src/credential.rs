//! In-memory credential storage
//!
//! Holds the one access/refresh token pair a client owns, plus a generation
//! counter bumped on every replacement. Readers take the `RwLock` read side
//! to clone a consistent snapshot; the generation is mirrored in an atomic so
//! staleness checks don't copy token strings.

use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use tokio::sync::RwLock;
use tracing::debug;

/// An access/refresh token pair at a specific generation.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Bearer token attached to every request
    pub access_token: Secret<String>,
    /// Token used by the reauthenticator to obtain a new access token
    pub refresh_token: Secret<String>,
    /// Version of the stored credential this copy was taken from
    pub generation: u64,
}

impl Credential {
    /// Build a credential; the generation is assigned by `CredentialState`.
    pub fn new(access_token: impl Into<Secret<String>>, refresh_token: impl Into<Secret<String>>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            generation: 0,
        }
    }
}

/// Thread-safe owner of the current credential.
pub struct CredentialState {
    current: RwLock<Credential>,
    generation: AtomicU64,
}

impl CredentialState {
    /// Start at generation 0 with the given tokens.
    pub fn new(initial: Credential) -> Self {
        Self {
            current: RwLock::new(Credential {
                generation: 0,
                ..initial
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Read-consistent copy of the current credential.
    pub async fn snapshot(&self) -> Credential {
        self.current.read().await.clone()
    }

    /// Replace the tokens in place and return the new generation.
    ///
    /// The generation carried by `new` is ignored.
    pub async fn replace(&self, new: Credential) -> u64 {
        let mut current = self.current.write().await;
        let generation = current.generation + 1;
        current.access_token = new.access_token;
        current.refresh_token = new.refresh_token;
        current.generation = generation;
        self.generation.store(generation, Ordering::Release);
        debug!(generation, "credential replaced");
        generation
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
