//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub tmdb_base_url: String,
    /// Seeds the remote `config/tmdb` document when set.
    pub tmdb_api_key: Option<String>,
    /// File backing the local fallback settings (the catalog key).
    pub settings_path: PathBuf,
    pub cors_origin: String,
    pub dev_user_email: String,
    pub dev_user_name: Option<String>,
    pub allowed_emails: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        // --- Catalog Settings ---
        let tmdb_base_url = lookup("TMDB_BASE_URL")
            .unwrap_or_else(|| DEFAULT_TMDB_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let tmdb_api_key = lookup("TMDB_API_KEY").filter(|key| !key.trim().is_empty());
        let settings_path = lookup("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./stream_track_settings.json"));

        // --- Development Identity & Allowlist ---
        let dev_user_email = lookup("DEV_USER_EMAIL")
            .ok_or_else(|| ConfigError::MissingVar("DEV_USER_EMAIL".to_string()))?;
        if !dev_user_email.contains('@') {
            return Err(ConfigError::InvalidValue(
                "DEV_USER_EMAIL".to_string(),
                format!("'{}' is not an email address", dev_user_email),
            ));
        }
        let dev_user_name = lookup("DEV_USER_NAME");
        let allowed_emails = lookup("ALLOWED_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|email| !email.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_address,
            log_level,
            tmdb_base_url,
            tmdb_api_key,
            settings_path,
            cors_origin,
            dev_user_email,
            dev_user_name,
            allowed_emails,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_dev_user_is_set() {
        let config = Config::from_lookup(lookup_from(&[("DEV_USER_EMAIL", "me@example.com")]))
            .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.tmdb_base_url, DEFAULT_TMDB_BASE_URL);
        assert!(config.tmdb_api_key.is_none());
        assert!(config.allowed_emails.is_empty());
    }

    #[test]
    fn allowed_emails_are_split_and_trimmed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DEV_USER_EMAIL", "me@example.com"),
            ("ALLOWED_EMAILS", " me@example.com, ,friend@example.com "),
            ("TMDB_BASE_URL", "http://localhost:9999/3/"),
        ]))
        .unwrap();

        assert_eq!(
            config.allowed_emails,
            vec!["me@example.com".to_string(), "friend@example.com".to_string()]
        );
        assert_eq!(config.tmdb_base_url, "http://localhost:9999/3");
    }

    #[test]
    fn missing_dev_user_is_reported() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref name) if name == "DEV_USER_EMAIL"));
    }

    #[test]
    fn invalid_bind_address_is_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("DEV_USER_EMAIL", "me@example.com"),
            ("BIND_ADDRESS", "nowhere"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "BIND_ADDRESS"));
    }
}
