pub mod collection;
pub mod credentials;
pub mod session;

pub use collection::CollectionSyncStore;
pub use credentials::CredentialCache;
pub use session::SessionStore;
