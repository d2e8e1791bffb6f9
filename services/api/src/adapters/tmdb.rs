//! services/api/src/adapters/tmdb.rs
//!
//! This module contains the adapter for the TMDB catalog API.
//! It implements the `CatalogService` port from the `core` crate and resolves
//! its API key through the `CredentialCache` on every request.

use crate::stores::CredentialCache;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use stream_track_core::domain::{MediaType, PagedResults, WatchProviders};
use stream_track_core::ports::{CatalogService, PortError, PortResult};
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `CatalogService` port over TMDB's REST API.
#[derive(Clone)]
pub struct TmdbAdapter {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
}

impl TmdbAdapter {
    /// Creates a new `TmdbAdapter`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Issues one GET request. `failure` is the message reported on a failed response.
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        failure: &str,
    ) -> PortResult<T> {
        let api_key = self
            .credentials
            .get_key()
            .await
            .ok_or_else(|| PortError::NotConfigured("Missing API Key".to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Catalog request");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, "Catalog request failed: {}", e);
                PortError::Fetch(failure.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Catalog responded with an error");
            return Err(PortError::Fetch(failure.to_string()));
        }

        response.json::<T>().await.map_err(|e| {
            warn!(%url, "Could not parse catalog response: {}", e);
            PortError::Fetch(failure.to_string())
        })
    }
}

//=========================================================================================
// `CatalogService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogService for TmdbAdapter {
    async fn search_multi(&self, query: &str) -> PortResult<PagedResults> {
        let params = [
            ("query", query.to_string()),
            ("include_adult", "false".to_string()),
        ];
        self.fetch("/search/multi", &params, "Search failed").await
    }

    async fn get_details(&self, media_type: MediaType, id: u64) -> PortResult<Value> {
        let path = format!("/{}/{}", media_type, id);
        self.fetch(&path, &[], "Fetch details failed").await
    }

    async fn get_recommendations(
        &self,
        media_type: MediaType,
        id: u64,
        page: Option<u32>,
    ) -> PortResult<PagedResults> {
        let path = format!("/{}/{}/recommendations", media_type, id);
        let params = [("page", page.unwrap_or(1).to_string())];
        self.fetch(&path, &params, "Fetch recommendations failed").await
    }

    async fn get_watch_providers(
        &self,
        media_type: MediaType,
        id: u64,
    ) -> PortResult<WatchProviders> {
        let path = format!("/{}/{}/watch/providers", media_type, id);
        self.fetch(&path, &[], "Fetch watch providers failed").await
    }
}
