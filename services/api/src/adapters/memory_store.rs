//! services/api/src/adapters/memory_store.rs
//!
//! An in-process implementation of the `DocumentStore` port. It backs the
//! development server and the test-suite: documents live in memory, live
//! queries are fed from a change channel, and failures can be injected to
//! exercise the error paths of the stores built on top of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stream_track_core::domain::{Document, ID_FIELD};
use stream_track_core::ports::{
    Direction, DocumentStore, LiveQuery, PortError, PortResult, SnapshotStream,
};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const CHANGE_CAPACITY: usize = 64;

//=========================================================================================
// Internal State
//=========================================================================================

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<String, Map<String, Value>>>,
    offline: bool,
    denied: HashSet<String>,
    lookup_latency: Duration,
}

#[derive(Debug, Clone)]
enum Change {
    Updated(String),
    Failed { collection: String, message: String },
}

struct Inner {
    state: Mutex<StoreState>,
    changes: broadcast::Sender<Change>,
    lookups: AtomicUsize,
    active_watches: Arc<AtomicUsize>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, collection: &str) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(Change::Updated(collection.to_string()));
    }

    fn snapshot(&self, query: &LiveQuery) -> PortResult<Vec<Document>> {
        let state = self.state();
        ensure_available(&state, &query.collection)?;
        let mut documents: Vec<Document> = state
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order_by {
            documents.sort_by(|a, b| {
                let ordering = compare_fields(a.data.get(&order.field), b.data.get(&order.field));
                let ordering = match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            });
        }
        Ok(documents)
    }
}

fn ensure_available(state: &StoreState, collection: &str) -> PortResult<()> {
    if state.offline {
        return Err(PortError::Unexpected(
            "document store is unavailable".to_string(),
        ));
    }
    if state.denied.contains(collection) {
        return Err(PortError::PermissionDenied(format!(
            "access to '{}' is denied",
            collection
        )));
    }
    Ok(())
}

/// Orders timestamps chronologically, numbers numerically, everything else as text.
/// Documents without the field sort after those that have it.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => {
            match (a.parse::<DateTime<Utc>>(), b.parse::<DateTime<Utc>>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Counts a live query for as long as its stream is alive.
struct WatchGuard(Arc<AtomicUsize>);

impl WatchGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, AtomicOrdering::SeqCst);
        Self(counter)
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store held entirely in memory. Clones share the same data.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Creates a new, empty `InMemoryDocumentStore`.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                changes,
                lookups: AtomicUsize::new(0),
                active_watches: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Writes a document under a caller-chosen id (used for seeding).
    pub fn insert(&self, collection: &str, id: &str, data: Map<String, Value>) {
        self.inner
            .state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.inner.notify(collection);
    }

    /// All documents of a collection, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .state()
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// While offline every operation fails with an unexpected error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.state().offline = offline;
    }

    /// Denies (or re-allows) reads and writes on one collection.
    pub fn set_denied(&self, collection: &str, denied: bool) {
        let mut state = self.inner.state();
        if denied {
            state.denied.insert(collection.to_string());
        } else {
            state.denied.remove(collection);
        }
    }

    /// Delays every point lookup by `latency`.
    pub fn set_lookup_latency(&self, latency: Duration) {
        self.inner.state().lookup_latency = latency;
    }

    /// Delivers a snapshot failure to every live query on `collection`.
    pub fn fail_snapshots(&self, collection: &str, message: &str) {
        let _ = self.inner.changes.send(Change::Failed {
            collection: collection.to_string(),
            message: message.to_string(),
        });
    }

    /// Number of point lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.inner.lookups.load(AtomicOrdering::SeqCst)
    }

    /// Number of live queries currently open.
    pub fn active_watches(&self) -> usize {
        self.inner.active_watches.load(AtomicOrdering::SeqCst)
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        self.inner.lookups.fetch_add(1, AtomicOrdering::SeqCst);
        let latency = self.inner.state().lookup_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.inner.state();
        ensure_available(&state, collection)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn add(&self, collection: &str, mut data: Map<String, Value>) -> PortResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        data.remove(ID_FIELD);
        {
            let mut state = self.inner.state();
            ensure_available(&state, collection)?;
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), data);
        }
        debug!(collection, %id, "Document added");
        self.inner.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> PortResult<()> {
        {
            let mut state = self.inner.state();
            ensure_available(&state, collection)?;
            let document = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))?;
            for (field, value) in fields {
                if field != ID_FIELD {
                    document.insert(field, value);
                }
            }
        }
        debug!(collection, id, "Document updated");
        self.inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        {
            let mut state = self.inner.state();
            ensure_available(&state, collection)?;
            // Deleting a missing document is not an error.
            if let Some(docs) = state.collections.get_mut(collection) {
                docs.remove(id);
            }
        }
        debug!(collection, id, "Document deleted");
        self.inner.notify(collection);
        Ok(())
    }

    fn watch(&self, query: LiveQuery) -> SnapshotStream {
        let inner = Arc::clone(&self.inner);
        // Subscribe before the first snapshot is taken so no change slips in between.
        let mut changes = inner.changes.subscribe();
        let guard = WatchGuard::new(Arc::clone(&inner.active_watches));

        Box::pin(async_stream::stream! {
            let _guard = guard;
            yield inner.snapshot(&query);
            loop {
                match changes.recv().await {
                    Ok(Change::Updated(collection)) if collection == query.collection => {
                        yield inner.snapshot(&query);
                    }
                    Ok(Change::Failed { collection, message }) if collection == query.collection => {
                        yield Err(PortError::Unexpected(message));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield inner.snapshot(&query);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
