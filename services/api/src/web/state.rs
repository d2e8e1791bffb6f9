//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: the single instance of every store,
//! created once at startup and handed to all handlers.

use crate::adapters::TmdbAdapter;
use crate::config::Config;
use crate::guard::RouteGuard;
use crate::stores::{CollectionSyncStore, CredentialCache, SessionStore};
use std::sync::Arc;
use stream_track_core::domain::{IgnoredItem, MediaItem};
use stream_track_core::ports::{AuthProvider, CatalogService, DocumentStore, SettingsStore};
use tokio::task::JoinHandle;
use tracing::info;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: Arc<SessionStore>,
    pub media: Arc<CollectionSyncStore<MediaItem>>,
    pub ignored: Arc<CollectionSyncStore<IgnoredItem>>,
    pub credentials: Arc<CredentialCache>,
    pub catalog: Arc<dyn CatalogService>,
    pub guard: Arc<RouteGuard>,
}

impl AppState {
    /// Wires every store to the given backends. Must run inside a Tokio runtime,
    /// since the session store registers its auth-state listener here.
    pub fn new(
        config: Arc<Config>,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let credentials = Arc::new(CredentialCache::new(store.clone(), settings));
        let catalog = Arc::new(TmdbAdapter::new(
            reqwest::Client::new(),
            config.tmdb_base_url.clone(),
            credentials.clone(),
        ));

        Self {
            session: Arc::new(SessionStore::start(auth.clone(), store.clone())),
            media: Arc::new(CollectionSyncStore::new(store.clone())),
            ignored: Arc::new(CollectionSyncStore::new(store)),
            guard: Arc::new(RouteGuard::new(auth)),
            credentials,
            catalog,
            config,
        }
    }

    /// Keeps the collection subscriptions in step with the session: open while
    /// the session is authorized, closed (and emptied) otherwise.
    pub fn spawn_collection_lifecycle(&self) -> JoinHandle<()> {
        let mut session = self.session.subscribe();
        let media = self.media.clone();
        let ignored = self.ignored.clone();

        tokio::spawn(async move {
            loop {
                let authorized = session.borrow_and_update().authorized;
                if authorized {
                    media.subscribe().await;
                    ignored.subscribe().await;
                } else {
                    media.unsubscribe().await;
                    ignored.unsubscribe().await;
                }
                if session.changed().await.is_err() {
                    info!("Session store dropped; collection lifecycle stopped");
                    break;
                }
            }
        })
    }
}

/// Builds an `AppState` over the given backends with a temporary settings file.
#[cfg(test)]
pub(crate) fn test_state(
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("settings.json");
    let config = Config::from_lookup(|name| match name {
        "DEV_USER_EMAIL" => Some("me@example.com".to_string()),
        "SETTINGS_PATH" => Some(settings_path.display().to_string()),
        _ => None,
    })
    .unwrap();
    let settings = Arc::new(crate::adapters::FileSettingsStore::new(&settings_path));
    (AppState::new(Arc::new(config), auth, store, settings), dir)
}
