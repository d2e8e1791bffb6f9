pub mod domain;
pub mod observable;
pub mod ports;

pub use domain::{
    CatalogEntry, Document, EditableRecord, IgnoredItem, MediaItem, MediaItemPatch, MediaType,
    NewIgnoredItem, NewMediaItem, PagedResults, Principal, Record, SessionState, WatchProviders,
};
pub use observable::{next_event, Observable};
pub use ports::{
    AuthProvider, AuthStateStream, CatalogService, Direction, DocumentStore, LiveQuery, PortError,
    PortResult, SettingsStore, SnapshotStream,
};
