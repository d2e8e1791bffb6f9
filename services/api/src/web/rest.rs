//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::auth::{self, SessionView};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stream_track_core::domain::{MediaItemPatch, MediaType, NewIgnoredItem, NewMediaItem};
use stream_track_core::ports::PortError;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::session_handler,
        auth::login_handler,
        auth::logout_handler,
        list_media_handler,
        create_media_handler,
        update_media_handler,
        delete_media_handler,
        list_ignored_handler,
        create_ignored_handler,
        search_handler,
        details_handler,
        recommendations_handler,
        providers_handler,
        save_api_key_handler,
    ),
    components(
        schemas(SessionView, CreatedResponse, ApiKeyRequest)
    ),
    tags(
        (name = "Stream Track API", description = "Watchlist, catalog search and session endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after a record has been written.
#[derive(Serialize, ToSchema)]
pub struct CreatedResponse {
    id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ApiKeyRequest {
    pub key: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: String,
}

#[derive(Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
}

/// Maps service errors onto HTTP status codes.
pub fn error_response(err: ApiError) -> (StatusCode, String) {
    let status = match &err {
        ApiError::MissingApiKey => StatusCode::PRECONDITION_FAILED,
        ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
        ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
        ApiError::Authorization(_) => StatusCode::FORBIDDEN,
        ApiError::SessionPending => StatusCode::SERVICE_UNAVAILABLE,
        ApiError::RemoteWrite(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
        ApiError::RemoteWrite(PortError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        ApiError::RemoteWrite(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn parse_media_type(raw: &str) -> Result<MediaType, (StatusCode, String)> {
    raw.parse::<MediaType>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

//=========================================================================================
// Watchlist Handlers
//=========================================================================================

/// List the watchlist, newest first.
#[utoipa::path(
    get,
    path = "/media",
    responses(
        (status = 200, description = "The mirrored watchlist"),
        (status = 401, description = "No signed-in user"),
        (status = 403, description = "User is not on the allowlist")
    )
)]
pub async fn list_media_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.media.items())
}

/// Add an item to the watchlist.
///
/// The item appears in `GET /media` once the remote store reports it back.
#[utoipa::path(
    post,
    path = "/media",
    request_body(content_type = "application/json", description = "The new watchlist item."),
    responses(
        (status = 201, description = "Item written", body = CreatedResponse),
        (status = 502, description = "The remote store rejected the write")
    )
)]
pub async fn create_media_handler(
    State(state): State<Arc<AppState>>,
    Json(item): Json<NewMediaItem>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = state.media.create(&item).await.map_err(|e| {
        error!("Failed to create media item: {}", e);
        error_response(e)
    })?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Update the given fields of a watchlist item.
#[utoipa::path(
    patch,
    path = "/media/{id}",
    request_body(content_type = "application/json", description = "The fields to change."),
    params(
        ("id" = String, Path, description = "The id of the watchlist item.")
    ),
    responses(
        (status = 204, description = "Item updated"),
        (status = 404, description = "No such item")
    )
)]
pub async fn update_media_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut patch): Json<MediaItemPatch>,
) -> Result<StatusCode, (StatusCode, String)> {
    patch.id = id;
    state.media.update(&patch).await.map_err(|e| {
        error!("Failed to update media item {}: {}", patch.id, e);
        error_response(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove an item from the watchlist.
#[utoipa::path(
    delete,
    path = "/media/{id}",
    params(
        ("id" = String, Path, description = "The id of the watchlist item.")
    ),
    responses(
        (status = 204, description = "Item deleted")
    )
)]
pub async fn delete_media_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.media.delete(&id).await.map_err(|e| {
        error!("Failed to delete media item {}: {}", id, e);
        error_response(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Ignored Items Handlers
//=========================================================================================

/// List the catalog entries hidden from recommendations.
#[utoipa::path(
    get,
    path = "/ignored",
    responses(
        (status = 200, description = "The mirrored ignore list")
    )
)]
pub async fn list_ignored_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ignored.items())
}

/// Hide a catalog entry from recommendations.
#[utoipa::path(
    post,
    path = "/ignored",
    request_body(content_type = "application/json", description = "The catalog entry to hide."),
    responses(
        (status = 201, description = "Entry written", body = CreatedResponse)
    )
)]
pub async fn create_ignored_handler(
    State(state): State<Arc<AppState>>,
    Json(item): Json<NewIgnoredItem>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = state.ignored.create(&item).await.map_err(|e| {
        error!("Failed to ignore catalog entry {}: {}", item.tmdb_id, e);
        error_response(e)
    })?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

//=========================================================================================
// Catalog Handlers
//=========================================================================================

/// Search movies and shows in the catalog.
#[utoipa::path(
    get,
    path = "/catalog/search",
    params(
        ("query" = String, Query, description = "Free-text search.")
    ),
    responses(
        (status = 200, description = "One page of results"),
        (status = 412, description = "The catalog API key is not configured"),
        (status = 502, description = "The catalog request failed")
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let results = state
        .catalog
        .search_multi(&params.query)
        .await
        .map_err(|e| error_response(ApiError::from_catalog(e)))?;
    Ok(Json(results))
}

/// Details of one movie or show.
#[utoipa::path(
    get,
    path = "/catalog/{media_type}/{id}",
    params(
        ("media_type" = String, Path, description = "`movie` or `tv`."),
        ("id" = u64, Path, description = "The catalog id.")
    ),
    responses(
        (status = 200, description = "The catalog details")
    )
)]
pub async fn details_handler(
    State(state): State<Arc<AppState>>,
    Path((media_type, id)): Path<(String, u64)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let media_type = parse_media_type(&media_type)?;
    let details = state
        .catalog
        .get_details(media_type, id)
        .await
        .map_err(|e| error_response(ApiError::from_catalog(e)))?;
    Ok(Json(details))
}

/// Recommendations based on one movie or show.
#[utoipa::path(
    get,
    path = "/catalog/{media_type}/{id}/recommendations",
    params(
        ("media_type" = String, Path, description = "`movie` or `tv`."),
        ("id" = u64, Path, description = "The catalog id."),
        ("page" = Option<u32>, Query, description = "Result page, defaults to 1.")
    ),
    responses(
        (status = 200, description = "One page of recommendations")
    )
)]
pub async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Path((media_type, id)): Path<(String, u64)>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let media_type = parse_media_type(&media_type)?;
    let results = state
        .catalog
        .get_recommendations(media_type, id, params.page)
        .await
        .map_err(|e| error_response(ApiError::from_catalog(e)))?;
    Ok(Json(results))
}

/// Where a movie or show can be streamed.
#[utoipa::path(
    get,
    path = "/catalog/{media_type}/{id}/providers",
    params(
        ("media_type" = String, Path, description = "`movie` or `tv`."),
        ("id" = u64, Path, description = "The catalog id.")
    ),
    responses(
        (status = 200, description = "Watch providers keyed by region")
    )
)]
pub async fn providers_handler(
    State(state): State<Arc<AppState>>,
    Path((media_type, id)): Path<(String, u64)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let media_type = parse_media_type(&media_type)?;
    let providers = state
        .catalog
        .get_watch_providers(media_type, id)
        .await
        .map_err(|e| error_response(ApiError::from_catalog(e)))?;
    Ok(Json(providers))
}

//=========================================================================================
// Settings Handlers
//=========================================================================================

/// Save the catalog API key to the local settings file.
#[utoipa::path(
    put,
    path = "/settings/api-key",
    request_body = ApiKeyRequest,
    responses(
        (status = 204, description = "Key saved"),
        (status = 400, description = "Empty key")
    )
)]
pub async fn save_api_key_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if req.key.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "key must not be empty".to_string()));
    }
    state.credentials.save_local_key(&req.key).await.map_err(|e| {
        error!("Failed to save API key: {}", e);
        error_response(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(error_response(ApiError::MissingApiKey).0, StatusCode::PRECONDITION_FAILED);
        assert_eq!(error_response(ApiError::Fetch("x".into())).0, StatusCode::BAD_GATEWAY);
        assert_eq!(
            error_response(ApiError::Authorization("not authorized".into())),
            (StatusCode::FORBIDDEN, "not authorized".to_string())
        );
        assert_eq!(error_response(ApiError::SessionPending).0, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            error_response(ApiError::RemoteWrite(PortError::NotFound("x".into()))).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(ApiError::RemoteWrite(PortError::Unexpected("x".into()))).0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn media_type_path_segments_are_validated() {
        assert_eq!(parse_media_type("tv"), Ok(MediaType::Tv));
        assert_eq!(parse_media_type("person").unwrap_err().0, StatusCode::BAD_REQUEST);
    }
}
