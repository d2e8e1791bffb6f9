//! crates/stream_track_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete auth provider, document store and catalog API.

use crate::domain::{Document, MediaType, PagedResults, Principal, WatchProviders};
use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("{0}")]
    Fetch(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Auth-state notifications: the current principal (or `None`) right away, then every change.
pub type AuthStateStream = Pin<Box<dyn Stream<Item = Option<Principal>> + Send>>;

/// Live query results: one complete, ordered snapshot per change.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = PortResult<Vec<Document>>> + Send>>;

//=========================================================================================
// Query Description
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A live query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
    pub collection: String,
    pub order_by: Option<OrderBy>,
}

impl LiveQuery {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Runs the interactive sign-in flow.
    async fn sign_in(&self) -> PortResult<Principal>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Opens a new auth-state subscription. Dropping the stream detaches it.
    fn auth_state_changes(&self) -> AuthStateStream;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup. `Ok(None)` means the document does not exist.
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>>;

    /// Adds a document and returns the id generated by the store.
    async fn add(&self, collection: &str, data: Map<String, Value>) -> PortResult<String>;

    /// Merges `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>)
        -> PortResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;

    /// Opens a live query. Dropping the stream cancels the subscription.
    fn watch(&self, query: LiveQuery) -> SnapshotStream;
}

/// The local persisted key/value store used as a fallback for settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Searches movies, shows and people by free text.
    async fn search_multi(&self, query: &str) -> PortResult<PagedResults>;

    async fn get_details(&self, media_type: MediaType, id: u64) -> PortResult<Value>;

    /// `page` defaults to the first page.
    async fn get_recommendations(
        &self,
        media_type: MediaType,
        id: u64,
        page: Option<u32>,
    ) -> PortResult<PagedResults>;

    async fn get_watch_providers(&self, media_type: MediaType, id: u64)
        -> PortResult<WatchProviders>;
}
