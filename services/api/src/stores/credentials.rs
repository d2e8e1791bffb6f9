//! services/api/src/stores/credentials.rs
//!
//! Resolves the catalog API key. The remote `config/tmdb` document wins and is
//! memoized for the life of the process; the local settings file is the
//! fallback when the remote copy is missing or unreachable.

use crate::error::ApiError;
use std::sync::{Arc, PoisonError, RwLock};
use stream_track_core::domain::collections::{CONFIG, TMDB_CONFIG_DOC};
use stream_track_core::ports::{DocumentStore, SettingsStore};
use tracing::{debug, info, warn};

/// Settings key of the locally persisted catalog API key.
pub const TMDB_API_KEY_SETTING: &str = "tmdb_api_key";
const KEY_FIELD: &str = "key";

pub struct CredentialCache {
    store: Arc<dyn DocumentStore>,
    settings: Arc<dyn SettingsStore>,
    cached: RwLock<Option<String>>,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn DocumentStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            settings,
            cached: RwLock::new(None),
        }
    }

    fn memoized(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the catalog API key, or `None` when it is not configured anywhere.
    ///
    /// Remote lookup failures are treated as "not found" and never surface.
    pub async fn get_key(&self) -> Option<String> {
        if let Some(key) = self.memoized() {
            return Some(key);
        }

        match self.store.get(CONFIG, TMDB_CONFIG_DOC).await {
            Ok(Some(doc)) => {
                if let Some(key) = doc.get_str(KEY_FIELD).map(str::trim).filter(|k| !k.is_empty()) {
                    let key = key.to_string();
                    *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
                    info!("Catalog API key loaded from remote config");
                    return Some(key);
                }
                debug!("Remote config has no catalog API key");
            }
            Ok(None) => debug!("No remote catalog config document"),
            Err(e) => warn!("Remote config lookup failed, using local settings: {}", e),
        }

        match self.settings.get(TMDB_API_KEY_SETTING).await {
            Ok(key) => key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            Err(e) => {
                warn!("Could not read local settings: {}", e);
                None
            }
        }
    }

    /// Persists `key` as the local fallback.
    pub async fn save_local_key(&self, key: &str) -> Result<(), ApiError> {
        self.settings
            .set(TMDB_API_KEY_SETTING, key.trim())
            .await
            .map_err(ApiError::Port)?;
        info!("Catalog API key saved to local settings");
        Ok(())
    }
}
