//! services/api/src/guard.rs
//!
//! The navigation guard. It only checks *authentication*: a destination other
//! than `login` needs a signed-in principal. Allowlist authorization is left to
//! the feature surfaces, which wait for the session to settle.

use std::sync::Arc;
use stream_track_core::domain::Principal;
use stream_track_core::observable::next_event;
use stream_track_core::ports::AuthProvider;
use tracing::{debug, info};

/// The destination that is always reachable.
pub const LOGIN_ROUTE: &str = "login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Carries the principal the decision was made for (`None` on `login`).
    Proceed(Option<Principal>),
    Redirect(String),
}

pub struct RouteGuard {
    auth: Arc<dyn AuthProvider>,
}

impl RouteGuard {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self { auth }
    }

    /// Decides whether navigation to `destination` may continue.
    ///
    /// Waits for the provider's first report on a fresh subscription instead of
    /// reading session state, which may not be populated yet right after startup.
    pub async fn before_each(&self, destination: &str) -> Navigation {
        if destination == LOGIN_ROUTE {
            return Navigation::Proceed(None);
        }

        match next_event(self.auth.auth_state_changes()).await.flatten() {
            Some(principal) => {
                debug!(destination, email = %principal.email, "Navigation allowed");
                Navigation::Proceed(Some(principal))
            }
            None => {
                info!(destination, "No signed-in user, redirecting to login");
                Navigation::Redirect(LOGIN_ROUTE.to_string())
            }
        }
    }
}
