//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire service.

use crate::config::ConfigError;
use stream_track_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The catalog API key could not be resolved from any source.
    #[error("Catalog API key is not configured")]
    MissingApiKey,

    /// Interactive sign-in or sign-out failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A principal is signed in but is not on the allowlist. Carries the session's reason.
    #[error("{0}")]
    Authorization(String),

    /// The allowlist check for the signed-in principal did not finish in time.
    #[error("Session is still loading")]
    SessionPending,

    /// A create, update or delete was rejected by the remote store.
    #[error("Remote write failed: {0}")]
    RemoteWrite(PortError),

    /// A live snapshot could not be delivered or decoded.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The catalog API answered with a failure.
    #[error("Catalog request failed: {0}")]
    Fetch(String),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// Splits catalog port failures into the configuration/fetch taxonomy.
    pub fn from_catalog(err: PortError) -> Self {
        match err {
            PortError::NotConfigured(_) => ApiError::MissingApiKey,
            PortError::Fetch(message) => ApiError::Fetch(message),
            other => ApiError::Port(other),
        }
    }
}
