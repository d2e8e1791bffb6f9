//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FileSettingsStore, InMemoryAuthProvider, InMemoryDocumentStore},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use stream_track_core::domain::collections::{ALLOWED_USERS, CONFIG, TMDB_CONFIG_DOC};
use stream_track_core::domain::Principal;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Set Up the Development Backends ---
    let store = Arc::new(InMemoryDocumentStore::new());
    for email in &config.allowed_emails {
        store.insert(ALLOWED_USERS, email, Map::new());
    }
    info!("Allowlist seeded with {} user(s)", config.allowed_emails.len());
    if let Some(key) = &config.tmdb_api_key {
        let mut data = Map::new();
        data.insert("key".to_string(), Value::String(key.clone()));
        store.insert(CONFIG, TMDB_CONFIG_DOC, data);
        info!("Remote catalog config seeded from TMDB_API_KEY");
    }

    let auth = Arc::new(InMemoryAuthProvider::new(Principal {
        id: Uuid::new_v4().to_string(),
        email: config.dev_user_email.clone(),
        display_name: config.dev_user_name.clone(),
    }));
    let settings = Arc::new(FileSettingsStore::new(config.settings_path.clone()));
    info!("Local settings file: {}", settings.path().display());

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), auth, store, settings));
    let _lifecycle = app_state.spawn_collection_lifecycle();

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = web::router(app_state)
        .layer(cors)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
