//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: the public `login` destination and logout.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stream_track_core::domain::SessionState;
use tracing::error;
use utoipa::ToSchema;

use crate::web::state::AppState;

/// How long login/logout wait for the auth-state listener to apply the change.
const SETTLE_WAIT: Duration = Duration::from_secs(10);

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub authorized: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl From<SessionState> for SessionView {
    fn from(state: SessionState) -> Self {
        let (user_id, email, display_name) = match state.principal {
            Some(p) => (Some(p.id), Some(p.email), p.display_name),
            None => (None, None, None),
        };
        Self {
            user_id,
            email,
            display_name,
            authorized: state.authorized,
            loading: state.loading,
            last_error: state.last_error,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /login - Current session state
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Current session state", body = SessionView)
    )
)]
pub async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.session.state().into())
}

/// POST /login - Run the sign-in flow
#[utoipa::path(
    post,
    path = "/login",
    responses(
        (status = 200, description = "Signed in; authorization is resolved", body = SessionView),
        (status = 401, description = "Sign-in failed"),
        (status = 504, description = "The session did not settle in time")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Run the interactive sign-in
    let principal = state.session.login().await.map_err(|e| {
        error!("Failed to sign in: {}", e);
        (StatusCode::UNAUTHORIZED, e.to_string())
    })?;

    // 2. Wait for the listener to apply the new principal and its allowlist check
    let settled = tokio::time::timeout(
        SETTLE_WAIT,
        state.session.wait_for(|s| {
            !s.loading && s.principal.as_ref().map(|p| &p.id) == Some(&principal.id)
        }),
    )
    .await
    .map_err(|_| {
        error!("Session did not settle after sign-in");
        (StatusCode::GATEWAY_TIMEOUT, "Session did not settle".to_string())
    })?;

    Ok((StatusCode::OK, Json(SessionView::from(settled))))
}

/// POST /logout - Sign out
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Signed out", body = SessionView),
        (status = 401, description = "No signed-in user"),
        (status = 500, description = "Sign-out failed")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.session.logout().await.map_err(|e| {
        error!("Failed to sign out: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let settled = tokio::time::timeout(
        SETTLE_WAIT,
        state.session.wait_for(|s| !s.loading && s.principal.is_none()),
    )
    .await
    .map_err(|_| {
        error!("Session did not settle after sign-out");
        (StatusCode::GATEWAY_TIMEOUT, "Session did not settle".to_string())
    })?;

    Ok((StatusCode::OK, Json(SessionView::from(settled))))
}
