//! services/api/src/adapters/memory_auth.rs
//!
//! An in-process implementation of the `AuthProvider` port. The "interactive"
//! sign-in signs in a fixed principal; the provider can start in a restoring
//! state to reproduce the window where a reloaded client does not yet know
//! who is signed in.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use stream_track_core::domain::Principal;
use stream_track_core::ports::{AuthProvider, AuthStateStream, PortError, PortResult};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone)]
struct AuthSnapshot {
    restored: bool,
    principal: Option<Principal>,
}

#[derive(Default)]
struct Failures {
    sign_in: Option<String>,
    sign_out: Option<String>,
}

/// An auth provider that keeps its state in a `watch` channel.
pub struct InMemoryAuthProvider {
    current: watch::Sender<AuthSnapshot>,
    sign_in_as: Principal,
    failures: Mutex<Failures>,
}

impl InMemoryAuthProvider {
    /// Signed out; `sign_in` will sign in `sign_in_as`.
    pub fn new(sign_in_as: Principal) -> Self {
        Self::with_snapshot(
            sign_in_as,
            AuthSnapshot {
                restored: true,
                principal: None,
            },
        )
    }

    /// Already signed in as `principal` (a restored session).
    pub fn signed_in(principal: Principal) -> Self {
        Self::with_snapshot(
            principal.clone(),
            AuthSnapshot {
                restored: true,
                principal: Some(principal),
            },
        )
    }

    /// Reports nothing until `finish_restore` is called.
    pub fn restoring(sign_in_as: Principal) -> Self {
        Self::with_snapshot(
            sign_in_as,
            AuthSnapshot {
                restored: false,
                principal: None,
            },
        )
    }

    fn with_snapshot(sign_in_as: Principal, snapshot: AuthSnapshot) -> Self {
        let (current, _) = watch::channel(snapshot);
        Self {
            current,
            sign_in_as,
            failures: Mutex::new(Failures::default()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Completes session restoration with the given principal.
    pub fn finish_restore(&self, principal: Option<Principal>) {
        self.current.send_replace(AuthSnapshot {
            restored: true,
            principal,
        });
    }

    /// Changes the signed-in principal from outside (token expiry, another tab, ...).
    pub fn set_principal(&self, principal: Option<Principal>) {
        self.finish_restore(principal);
    }

    /// Makes the next `sign_in` fail with `message`.
    pub fn fail_next_sign_in(&self, message: &str) {
        self.failures().sign_in = Some(message.to_string());
    }

    /// Makes the next `sign_out` fail with `message`.
    pub fn fail_next_sign_out(&self, message: &str) {
        self.failures().sign_out = Some(message.to_string());
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.current.borrow().principal.clone()
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(&self) -> PortResult<Principal> {
        if let Some(message) = self.failures().sign_in.take() {
            return Err(PortError::Unexpected(message));
        }
        info!(email = %self.sign_in_as.email, "Signing in");
        self.set_principal(Some(self.sign_in_as.clone()));
        Ok(self.sign_in_as.clone())
    }

    async fn sign_out(&self) -> PortResult<()> {
        if let Some(message) = self.failures().sign_out.take() {
            return Err(PortError::Unexpected(message));
        }
        info!("Signing out");
        self.set_principal(None);
        Ok(())
    }

    fn auth_state_changes(&self) -> AuthStateStream {
        let mut rx = self.current.subscribe();
        Box::pin(async_stream::stream! {
            let first = rx
                .wait_for(|snapshot| snapshot.restored)
                .await
                .map(|snapshot| snapshot.principal.clone());
            if let Ok(principal) = first {
                yield principal;
                while rx.changed().await.is_ok() {
                    let principal = rx.borrow_and_update().principal.clone();
                    yield principal;
                }
            }
        })
    }
}
