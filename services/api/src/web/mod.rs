pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::{require_authorized, require_principal};
pub use state::AppState;

/// Builds the application router.
///
/// The `login` destination is public. Every other route passes the route guard,
/// and feature routes additionally require an authorized session.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (the login destination)
    let public_routes = Router::new().route(
        "/login",
        get(auth::session_handler).post(auth::login_handler),
    );

    // Feature routes (signed in and on the allowlist)
    let feature_routes = Router::new()
        .route(
            "/media",
            get(rest::list_media_handler).post(rest::create_media_handler),
        )
        .route(
            "/media/{id}",
            patch(rest::update_media_handler).delete(rest::delete_media_handler),
        )
        .route(
            "/ignored",
            get(rest::list_ignored_handler).post(rest::create_ignored_handler),
        )
        .route("/catalog/search", get(rest::search_handler))
        .route("/catalog/{media_type}/{id}", get(rest::details_handler))
        .route(
            "/catalog/{media_type}/{id}/recommendations",
            get(rest::recommendations_handler),
        )
        .route(
            "/catalog/{media_type}/{id}/providers",
            get(rest::providers_handler),
        )
        .route("/settings/api-key", put(rest::save_api_key_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_authorized,
        ));

    // Protected routes (signed in)
    let protected_routes = Router::new()
        .route("/logout", post(auth::logout_handler))
        .merge(feature_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_principal,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
