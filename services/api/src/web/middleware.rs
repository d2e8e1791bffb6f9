//! services/api/src/web/middleware.rs
//!
//! Middleware protecting the routes. `require_principal` runs the route guard
//! (authentication only); `require_authorized` additionally gates feature
//! routes on the allowlist check for the principal the guard resolved.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use stream_track_core::domain::Principal;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::guard::Navigation;
use crate::stores::session::NOT_AUTHORIZED;
use crate::web::rest::error_response;
use crate::web::state::AppState;

/// How long a request waits for a pending allowlist check.
const AUTHORIZATION_WAIT: Duration = Duration::from_secs(10);

/// The destination name of a request path: its first segment.
pub fn destination(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or_default()
}

/// Middleware that lets a request through only when somebody is signed in.
///
/// Returns 401 Unauthorized when the guard redirects to login. The resolved
/// principal is stored in the request extensions for `require_authorized`.
pub async fn require_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let target = destination(req.uri().path()).to_string();
    match state.guard.before_each(&target).await {
        Navigation::Proceed(principal) => {
            if let Some(principal) = principal {
                req.extensions_mut().insert(principal);
            }
            Ok(next.run(req).await)
        }
        Navigation::Redirect(to) => {
            info!(destination = %target, redirect = %to, "Request rejected by the route guard");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Waits until the session has settled for `principal` and checks `authorized`.
///
/// A settled state that belongs to a previous principal never counts.
pub async fn authorize(state: &AppState, principal: &Principal) -> Result<(), ApiError> {
    let settled = tokio::time::timeout(
        AUTHORIZATION_WAIT,
        state
            .session
            .wait_for(|s| !s.loading && s.principal.as_ref() == Some(principal)),
    )
    .await
    .map_err(|_| ApiError::SessionPending)?;

    if settled.authorized {
        Ok(())
    } else {
        Err(ApiError::Authorization(
            settled
                .last_error
                .unwrap_or_else(|| NOT_AUTHORIZED.to_string()),
        ))
    }
}

/// Middleware that requires the principal resolved by `require_principal` to be
/// on the allowlist.
///
/// Returns 403 Forbidden for principals that are not on the allowlist and
/// 503 Service Unavailable if the allowlist check does not finish in time.
pub async fn require_authorized(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(principal) = req.extensions().get::<Principal>().cloned() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match authorize(&state, &principal).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            warn!(path = %req.uri().path(), email = %principal.email, "Request not authorized: {}", e);
            error_response(e).into_response()
        }
    }
}
