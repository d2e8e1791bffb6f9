//! services/api/src/stores/session.rs
//!
//! The process-wide session store. It owns the single auth-state listener,
//! resolves allowlist membership for every signed-in principal, and exposes the
//! resulting `SessionState` as an observable value.

use crate::error::ApiError;
use futures::StreamExt;
use std::sync::Arc;
use stream_track_core::domain::collections::ALLOWED_USERS;
use stream_track_core::domain::{Principal, SessionState};
use stream_track_core::observable::Observable;
use stream_track_core::ports::{AuthProvider, DocumentStore};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const NOT_AUTHORIZED: &str = "not authorized";
pub const VERIFICATION_FAILED: &str = "Error verifying user permissions";

pub struct SessionStore {
    state: Observable<SessionState>,
    auth: Arc<dyn AuthProvider>,
    listener: JoinHandle<()>,
}

impl SessionStore {
    /// Creates the store and registers its auth-state listener.
    ///
    /// Must be called from within a Tokio runtime. The listener runs until the
    /// store is dropped; notifications are handled strictly one after another.
    pub fn start(auth: Arc<dyn AuthProvider>, store: Arc<dyn DocumentStore>) -> Self {
        let state = Observable::new(SessionState::initial());
        let mut notifications = auth.auth_state_changes();

        let listener = tokio::spawn({
            let state = state.clone();
            async move {
                while let Some(principal) = notifications.next().await {
                    apply_auth_change(&state, store.as_ref(), principal).await;
                }
                warn!("Auth state notifications ended");
            }
        });

        Self {
            state,
            auth,
            listener,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.get().principal
    }

    pub fn is_authorized(&self) -> bool {
        self.state.get().authorized
    }

    pub fn is_loading(&self) -> bool {
        self.state.get().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.get().last_error
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Every state transition from now on, in order.
    pub fn changes(&self) -> broadcast::Receiver<SessionState> {
        self.state.changes()
    }

    pub async fn wait_for<F>(&self, predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        self.state.wait_for(predicate).await
    }

    /// Runs the interactive sign-in. The resulting state change arrives through
    /// the auth-state listener, not from here.
    pub async fn login(&self) -> Result<Principal, ApiError> {
        self.state.update(|s| s.last_error = None);
        match self.auth.sign_in().await {
            Ok(principal) => {
                info!(email = %principal.email, "Sign-in completed");
                Ok(principal)
            }
            Err(e) => {
                error!("Login error: {}", e);
                let message = e.to_string();
                self.state.update(|s| s.last_error = Some(message.clone()));
                Err(ApiError::Authentication(message))
            }
        }
    }

    /// Signs out. As with `login`, the listener applies the resulting state.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.auth.sign_out().await.map_err(|e| {
            error!("Logout error: {}", e);
            ApiError::Authentication(e.to_string())
        })
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Applies one auth-state notification. Never fails: lookup errors are
/// recorded in `last_error`.
async fn apply_auth_change(
    state: &Observable<SessionState>,
    store: &dyn DocumentStore,
    principal: Option<Principal>,
) {
    let email = principal.as_ref().map(|p| p.email.clone());
    // `authorized` is reset in the same transition that replaces the principal.
    state.update(|s| {
        s.loading = true;
        s.principal = principal;
        s.authorized = false;
        s.last_error = None;
    });

    let Some(email) = email else {
        info!("No signed-in user");
        state.update(|s| s.loading = false);
        return;
    };

    let (authorized, last_error) = match store.get(ALLOWED_USERS, &email).await {
        Ok(Some(_)) => {
            info!(%email, "User is on the allowlist");
            (true, None)
        }
        Ok(None) => {
            warn!(%email, "User not in allowlist");
            (false, Some(NOT_AUTHORIZED.to_string()))
        }
        Err(e) => {
            error!(%email, "Error checking allowlist: {}", e);
            (false, Some(VERIFICATION_FAILED.to_string()))
        }
    };

    state.update(|s| {
        s.authorized = authorized && s.principal.is_some();
        s.last_error = last_error;
        s.loading = false;
    });
}
