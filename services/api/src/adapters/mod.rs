pub mod memory_auth;
pub mod memory_store;
pub mod settings_file;
pub mod tmdb;

pub use memory_auth::InMemoryAuthProvider;
pub use memory_store::InMemoryDocumentStore;
pub use settings_file::FileSettingsStore;
pub use tmdb::TmdbAdapter;
