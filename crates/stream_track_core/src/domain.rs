//! crates/stream_track_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any particular backend; the serde
//! attributes describe the document shape shared with the remote store.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Names of the remote collections and well-known documents.
pub mod collections {
    pub const ALLOWED_USERS: &str = "allowed_users";
    pub const CONFIG: &str = "config";
    pub const TMDB_CONFIG_DOC: &str = "tmdb";
    pub const MEDIA_ITEMS: &str = "media_items";
    pub const IGNORED_ITEMS: &str = "ignored_items";
}

pub const ID_FIELD: &str = "id";
/// Sort key of every synchronized collection (newest first).
pub const CREATED_AT_FIELD: &str = "createdAt";

//=========================================================================================
// Identity & Session
//=========================================================================================

/// The authenticated identity handed out by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Process-wide view of who is signed in and whether they may use the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub principal: Option<Principal>,
    pub authorized: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl SessionState {
    /// The state before the auth provider has reported anything.
    pub fn initial() -> Self {
        Self {
            principal: None,
            authorized: false,
            loading: true,
            last_error: None,
        }
    }

    /// `authorized` may only be set while somebody is signed in.
    pub fn is_consistent(&self) -> bool {
        !self.authorized || self.principal.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

//=========================================================================================
// Remote Documents
//=========================================================================================

/// A raw document as held by the remote store: its id plus the stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decodes the document into a typed record, exposing the id as the `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut data = self.data.clone();
        data.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(data))
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// A record type that lives in a synchronized remote collection.
pub trait Record: Clone + Send + Sync + DeserializeOwned + 'static {
    const COLLECTION: &'static str;

    /// The caller-provided payload for a new record (no id, no timestamp).
    type Draft: Serialize + Send + Sync;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

/// A record type that also supports partial updates and deletion.
pub trait EditableRecord: Record {
    /// The fields to merge into an existing record, keyed by its id.
    type Patch: Serialize + Send + Sync;

    fn patch_id(patch: &Self::Patch) -> &str;
}

//=========================================================================================
// Media
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            other => Err(format!("unknown media type '{}'", other)),
        }
    }
}

/// A show or movie on the user's watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub tmdb_id: Option<u64>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Fields the app does not interpret (poster path, year, nickname, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItem {
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A partial update of a `MediaItem`. Only the fields that are set are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemPatch {
    #[serde(skip)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MediaItemPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl Record for MediaItem {
    const COLLECTION: &'static str = collections::MEDIA_ITEMS;
    type Draft = NewMediaItem;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl EditableRecord for MediaItem {
    type Patch = MediaItemPatch;

    fn patch_id(patch: &MediaItemPatch) -> &str {
        &patch.id
    }
}

/// A catalog entry the user chose to hide from recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredItem {
    pub id: String,
    pub tmdb_id: u64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIgnoredItem {
    pub tmdb_id: u64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub name: String,
}

impl Record for IgnoredItem {
    const COLLECTION: &'static str = collections::IGNORED_ITEMS;
    type Draft = NewIgnoredItem;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//=========================================================================================
// Catalog Payloads
//=========================================================================================

/// One page of catalog results (search or recommendations).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagedResults {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<CatalogEntry>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

/// A movie, show or person as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    /// Movies carry a `title`, shows and people a `name`.
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }
}

/// Streaming availability keyed by region code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchProviders {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
}
