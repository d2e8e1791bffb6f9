//! services/api/src/stores/collection.rs
//!
//! A local, ordered mirror of one remote collection. The mirror is only ever
//! written from the live subscription: every snapshot replaces it wholesale.
//! Writes go straight to the remote store and become visible once the next
//! snapshot arrives.

use crate::error::ApiError;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use stream_track_core::domain::{
    Document, EditableRecord, Record, CREATED_AT_FIELD, ID_FIELD,
};
use stream_track_core::observable::Observable;
use stream_track_core::ports::{Direction, DocumentStore, LiveQuery, PortError, SnapshotStream};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle of the running live subscription.
struct Subscription {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    /// False once the live query has ended on its own.
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct CollectionSyncStore<T: Record> {
    store: Arc<dyn DocumentStore>,
    mirror: Observable<Vec<T>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: Record> CollectionSyncStore<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            mirror: Observable::new(Vec::new()),
            subscription: Mutex::new(None),
        }
    }

    /// The items of the last delivered snapshot, newest first.
    pub fn items(&self) -> Vec<T> {
        self.mirror.get()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.mirror.subscribe()
    }

    pub fn changes(&self) -> broadcast::Receiver<Vec<T>> {
        self.mirror.changes()
    }

    pub async fn wait_for<F>(&self, predicate: F) -> Vec<T>
    where
        F: FnMut(&Vec<T>) -> bool,
    {
        self.mirror.wait_for(predicate).await
    }

    pub async fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_live)
    }

    /// Opens the live subscription. A no-op while one is already open; a
    /// subscription whose live query has ended is replaced.
    pub async fn subscribe(&self) {
        let mut slot = self.subscription.lock().await;
        match slot.as_ref() {
            Some(subscription) if subscription.is_live() => {
                debug!(collection = T::COLLECTION, "Already subscribed");
                return;
            }
            Some(_) => info!(collection = T::COLLECTION, "Live query had ended, reopening"),
            None => {}
        }

        let query =
            LiveQuery::collection(T::COLLECTION).order_by(CREATED_AT_FIELD, Direction::Descending);
        let snapshots = self.store.watch(query);
        let token = CancellationToken::new();
        let task = tokio::spawn(mirror_snapshots(snapshots, self.mirror.clone(), token.clone()));

        *slot = Some(Subscription { token, task });
        info!(collection = T::COLLECTION, "Live subscription opened");
    }

    /// Closes the live subscription and empties the mirror. A no-op when not subscribed.
    pub async fn unsubscribe(&self) {
        let mut slot = self.subscription.lock().await;
        let Some(subscription) = slot.take() else {
            return;
        };

        subscription.token.cancel();
        // Once the task has finished no late snapshot can repopulate the mirror.
        if let Err(e) = subscription.task.await {
            if !e.is_cancelled() {
                error!(collection = T::COLLECTION, "Subscription task failed: {}", e);
            }
        }
        self.mirror.set(Vec::new());
        info!(collection = T::COLLECTION, "Live subscription closed");
    }

    /// Writes a new record and returns the id assigned by the remote store.
    ///
    /// The mirror is not touched; the record shows up with the next snapshot.
    pub async fn create(&self, draft: &T::Draft) -> Result<String, ApiError> {
        let mut fields = to_fields(draft)?;
        fields.remove(ID_FIELD);
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let id = self
            .store
            .add(T::COLLECTION, fields)
            .await
            .map_err(|e| remote_write_failed::<T>("create", e))?;
        info!(collection = T::COLLECTION, %id, "Record created");
        Ok(id)
    }
}

impl<T: EditableRecord> CollectionSyncStore<T> {
    /// Merges the fields set on `patch` into the record it names.
    pub async fn update(&self, patch: &T::Patch) -> Result<(), ApiError> {
        let id = T::patch_id(patch);
        if id.is_empty() {
            return Err(ApiError::RemoteWrite(PortError::NotFound(
                "an update needs the id of an existing record".to_string(),
            )));
        }

        let mut fields = to_fields(patch)?;
        fields.remove(ID_FIELD);
        fields.remove(CREATED_AT_FIELD);

        self.store
            .update(T::COLLECTION, id, fields)
            .await
            .map_err(|e| remote_write_failed::<T>("update", e))?;
        info!(collection = T::COLLECTION, id, "Record updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.store
            .delete(T::COLLECTION, id)
            .await
            .map_err(|e| remote_write_failed::<T>("delete", e))?;
        info!(collection = T::COLLECTION, id, "Record deleted");
        Ok(())
    }
}

fn remote_write_failed<T: Record>(operation: &str, err: PortError) -> ApiError {
    error!(collection = T::COLLECTION, operation, "Remote write failed: {}", err);
    ApiError::RemoteWrite(err)
}

fn to_fields<S: Serialize>(value: &S) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ApiError::Internal(format!(
            "records must serialize to an object, got {}",
            other
        ))),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

fn decode_snapshot<T: Record>(documents: &[Document]) -> Result<Vec<T>, ApiError> {
    documents
        .iter()
        .map(|doc| {
            doc.decode()
                .map_err(|e| ApiError::Subscription(format!("document {}: {}", doc.id, e)))
        })
        .collect()
}

/// Feeds snapshots into the mirror until cancelled or the query ends.
async fn mirror_snapshots<T: Record>(
    mut snapshots: SnapshotStream,
    mirror: Observable<Vec<T>>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = snapshots.next() => match next {
                Some(Ok(documents)) => match decode_snapshot::<T>(&documents) {
                    Ok(items) => {
                        debug!(collection = T::COLLECTION, count = items.len(), "Snapshot applied");
                        mirror.set(items);
                    }
                    Err(e) => warn!(collection = T::COLLECTION, "Keeping last known items: {}", e),
                },
                Some(Err(e)) => {
                    let err = ApiError::Subscription(e.to_string());
                    warn!(collection = T::COLLECTION, "Keeping last known items: {}", err);
                }
                None => {
                    info!(collection = T::COLLECTION, "Live query ended");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;
    use stream_track_core::ports::PortResult;
    use stream_track_core::domain::{
        IgnoredItem, MediaItem, MediaItemPatch, MediaType, NewIgnoredItem, NewMediaItem,
    };
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn draft(title: &str) -> NewMediaItem {
        NewMediaItem {
            title: title.to_string(),
            media_type: MediaType::Tv,
            tmdb_id: Some(42),
            status: "watching".to_string(),
            rating: Some(4.5),
            notes: None,
            extra: Map::new(),
        }
    }

    fn media_store(store: &InMemoryDocumentStore) -> CollectionSyncStore<MediaItem> {
        CollectionSyncStore::new(Arc::new(store.clone()))
    }

    async fn wait_until<T: Record, F>(sync: &CollectionSyncStore<T>, predicate: F) -> Vec<T>
    where
        F: FnMut(&Vec<T>) -> bool,
    {
        timeout(WAIT, sync.wait_for(predicate))
            .await
            .expect("mirror never reached the expected state")
    }

    #[tokio::test]
    async fn subscribe_twice_keeps_a_single_live_query() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);

        media.subscribe().await;
        media.subscribe().await;

        assert!(media.is_subscribed().await);
        assert_eq!(store.active_watches(), 1);
    }

    /// Serves live queries that deliver one empty snapshot and then end.
    #[derive(Default)]
    struct EndingStore {
        watches: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for EndingStore {
        async fn get(&self, _collection: &str, _id: &str) -> PortResult<Option<Document>> {
            Ok(None)
        }

        async fn add(&self, _collection: &str, _data: Map<String, Value>) -> PortResult<String> {
            Err(PortError::Unexpected("read-only".to_string()))
        }

        async fn update(
            &self,
            _collection: &str,
            _id: &str,
            _fields: Map<String, Value>,
        ) -> PortResult<()> {
            Err(PortError::Unexpected("read-only".to_string()))
        }

        async fn delete(&self, _collection: &str, _id: &str) -> PortResult<()> {
            Err(PortError::Unexpected("read-only".to_string()))
        }

        fn watch(&self, _query: LiveQuery) -> SnapshotStream {
            self.watches.fetch_add(1, AtomicOrdering::SeqCst);
            Box::pin(futures::stream::iter(vec![Ok(Vec::new())]))
        }
    }

    #[tokio::test]
    async fn subscribe_reopens_a_live_query_that_ended() {
        let store = Arc::new(EndingStore::default());
        let media: CollectionSyncStore<MediaItem> = CollectionSyncStore::new(store.clone());

        media.subscribe().await;
        for _ in 0..100 {
            if !media.is_subscribed().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!media.is_subscribed().await);

        media.subscribe().await;
        assert_eq!(store.watches.load(AtomicOrdering::SeqCst), 2);

        media.unsubscribe().await;
        assert!(media.items().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_empties_the_mirror_and_closes_the_query() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;
        media.create(&draft("Dark")).await.unwrap();
        wait_until(&media, |items| items.len() == 1).await;

        media.unsubscribe().await;

        assert!(media.items().is_empty());
        assert!(!media.is_subscribed().await);
        assert_eq!(store.active_watches(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_when_not_subscribed_is_a_no_op() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.unsubscribe().await;
        assert!(media.items().is_empty());
    }

    #[tokio::test]
    async fn created_items_arrive_newest_first_with_id_and_timestamp() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;

        let first = media.create(&draft("Dark")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut newer = draft("Severance");
        newer.extra.insert("posterPath".to_string(), Value::from("/s.jpg"));
        let second = media.create(&newer).await.unwrap();

        let items = wait_until(&media, |items| items.len() == 2).await;
        assert_eq!(items[0].id, second);
        assert_eq!(items[1].id, first);
        assert_eq!(items[0].title, "Severance");
        assert_eq!(items[0].tmdb_id, Some(42));
        assert_eq!(items[0].rating, Some(4.5));
        assert_eq!(items[0].extra.get("posterPath"), Some(&Value::from("/s.jpg")));
        assert!(items[0].created_at > items[1].created_at);
    }

    #[tokio::test]
    async fn create_does_not_insert_optimistically() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);

        let id = media.create(&draft("Dark")).await.unwrap();

        assert!(media.items().is_empty());
        assert_eq!(store.documents(MediaItem::COLLECTION)[0].id, id);
    }

    #[tokio::test]
    async fn update_changes_only_the_given_fields() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;
        let id = media.create(&draft("Dark")).await.unwrap();
        let before = wait_until(&media, |items| items.len() == 1).await.remove(0);

        media
            .update(&MediaItemPatch::new(id.clone()).status("watched"))
            .await
            .unwrap();

        let after = wait_until(&media, |items| {
            items.first().map(|i| i.status.as_str()) == Some("watched")
        })
        .await
        .remove(0);
        assert_eq!(after.id, id);
        assert_eq!(
            MediaItem {
                status: before.status.clone(),
                ..after.clone()
            },
            before
        );
    }

    #[tokio::test]
    async fn update_without_an_id_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        let err = media
            .update(&MediaItemPatch::default().status("watched"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RemoteWrite(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn deleted_items_leave_the_mirror() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;
        let keep = media.create(&draft("Dark")).await.unwrap();
        let gone = media.create(&draft("Lost")).await.unwrap();
        wait_until(&media, |items| items.len() == 2).await;

        media.delete(&gone).await.unwrap();

        let items = wait_until(&media, |items| items.len() == 1).await;
        assert_eq!(items[0].id, keep);
        assert!(items.iter().all(|i| i.id != gone));
    }

    #[tokio::test]
    async fn remote_write_failures_are_returned_and_leave_the_mirror_alone() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;
        let id = media.create(&draft("Dark")).await.unwrap();
        wait_until(&media, |items| items.len() == 1).await;

        store.set_offline(true);
        assert!(matches!(
            media.create(&draft("Lost")).await,
            Err(ApiError::RemoteWrite(_))
        ));
        assert!(matches!(
            media.update(&MediaItemPatch::new(id.clone()).notes("x")).await,
            Err(ApiError::RemoteWrite(_))
        ));
        assert!(matches!(media.delete(&id).await, Err(ApiError::RemoteWrite(_))));
        assert_eq!(media.items().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_failures_keep_the_last_known_items() {
        let store = InMemoryDocumentStore::new();
        let media = media_store(&store);
        media.subscribe().await;
        media.create(&draft("Dark")).await.unwrap();
        wait_until(&media, |items| items.len() == 1).await;
        let mut changes = media.changes();

        store.fail_snapshots(MediaItem::COLLECTION, "permission revoked");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(media.items().len(), 1);
        assert!(changes.try_recv().is_err());
        assert!(media.is_subscribed().await);
    }

    #[tokio::test]
    async fn ignored_items_follow_the_same_mirror_pattern() {
        let store = InMemoryDocumentStore::new();
        let ignored: CollectionSyncStore<IgnoredItem> = CollectionSyncStore::new(Arc::new(store.clone()));
        ignored.subscribe().await;

        let id = ignored
            .create(&NewIgnoredItem {
                tmdb_id: 7,
                media_type: MediaType::Movie,
                name: "Cats".to_string(),
            })
            .await
            .unwrap();

        let items = wait_until(&ignored, |items| items.len() == 1).await;
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].tmdb_id, 7);
        assert_eq!(items[0].name, "Cats");
    }
}
