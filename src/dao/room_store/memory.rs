//! In-memory [`RoomStore`] used by tests and embedded deployments.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dao::{
    models::{RoomEntity, RoomFilter, RoomPatch},
    room_store::{RoomSignal, RoomStore, RoomSubscription},
    storage::{StorageError, StorageResult},
};

/// Process-local room store backed by a concurrent map, with per-document
/// watcher channels standing in for the hosted store's change feed.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rooms: DashMap<String, RoomEntity>,
    watchers: DashMap<String, Vec<mpsc::UnboundedSender<RoomSignal>>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live room documents, for test assertions.
    pub fn len(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Whether the store holds no room documents.
    pub fn is_empty(&self) -> bool {
        self.inner.rooms.is_empty()
    }
}

impl Inner {
    /// Fan a signal out to the room's watchers, pruning closed channels.
    fn notify(&self, id: &str, signal: &RoomSignal) {
        let Some(mut senders) = self.watchers.get_mut(id) else {
            return;
        };
        senders.retain(|sender| sender.send(signal.clone()).is_ok());
    }
}

impl RoomStore for MemoryRoomStore {
    fn create_auto(&self, mut room: RoomEntity) -> BoxFuture<'static, StorageResult<String>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let id = Uuid::new_v4().simple().to_string();
            room.id = id.clone();
            inner.rooms.insert(id.clone(), room);
            Ok(id)
        })
    }

    fn create_with_id(
        &self,
        id: String,
        mut room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            match inner.rooms.entry(id.clone()) {
                Entry::Occupied(_) => Err(StorageError::AlreadyExists { id }),
                Entry::Vacant(vacant) => {
                    room.id = id;
                    vacant.insert(room);
                    Ok(())
                }
            }
        })
    }

    fn find(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_owned();
        Box::pin(async move { Ok(inner.rooms.get(&id).map(|room| room.clone())) })
    }

    fn update(&self, id: &str, patch: RoomPatch) -> BoxFuture<'static, StorageResult<()>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_owned();
        Box::pin(async move {
            let updated = {
                let Some(mut room) = inner.rooms.get_mut(&id) else {
                    return Err(StorageError::NotFound { id });
                };
                patch.apply(&mut room);
                room.clone()
            };
            inner.notify(&id, &RoomSignal::Snapshot(updated));
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_owned();
        Box::pin(async move {
            if inner.rooms.remove(&id).is_some() {
                inner.notify(&id, &RoomSignal::Deleted);
            }
            inner.watchers.remove(&id);
            Ok(())
        })
    }

    fn query(&self, filter: RoomFilter) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            Ok(inner
                .rooms
                .iter()
                .filter(|entry| filter.matches(entry.value()))
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn subscribe(&self, id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_owned();
        Box::pin(async move {
            let Some(current) = inner.rooms.get(&id).map(|room| room.clone()) else {
                return Err(StorageError::NotFound { id });
            };
            let (tx, rx) = mpsc::unbounded_channel();
            // Initial snapshot goes through the channel so subscribers see a
            // uniform stream of signals.
            let _ = tx.send(RoomSignal::Snapshot(current));
            inner.watchers.entry(id).or_default().push(tx);
            Ok(RoomSubscription::new(rx, None))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use indexmap::IndexMap;

    use super::*;
    use crate::{
        dao::models::{RoomMode, TeamEntity},
        state::state_machine::RoomState,
    };

    fn sample_room(id: &str) -> RoomEntity {
        RoomEntity {
            id: id.into(),
            mode: RoomMode::AutoMatch,
            owner_id: None,
            players: Vec::new(),
            teams: vec![
                TeamEntity {
                    id: "team-a".into(),
                    name: "Takım A".into(),
                    player_ids: Vec::new(),
                    color: "#F97316".into(),
                },
                TeamEntity {
                    id: "team-b".into(),
                    name: "Takım B".into(),
                    player_ids: Vec::new(),
                    color: "#8B5CF6".into(),
                },
            ],
            state: RoomState::Waiting,
            round_number: 1,
            scores: IndexMap::new(),
            current_question: None,
            answers: IndexMap::new(),
            has_answered: IndexMap::new(),
            round_results: Vec::new(),
            created_at: SystemTime::now(),
            started_at: None,
        }
    }

    #[tokio::test]
    async fn create_with_id_rejects_collisions() {
        let store = MemoryRoomStore::new();
        store
            .create_with_id("ABC123".into(), sample_room("ABC123"))
            .await
            .unwrap();
        let err = store
            .create_with_id("ABC123".into(), sample_room("ABC123"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { id } if id == "ABC123"));
    }

    #[tokio::test]
    async fn update_missing_room_reports_not_found() {
        let store = MemoryRoomStore::new();
        let err = store
            .update("nope", RoomPatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryRoomStore::new();
        store
            .create_with_id("room".into(), sample_room("room"))
            .await
            .unwrap();
        store.delete("room").await.unwrap();
        store.delete("room").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn subscribe_delivers_snapshot_changes_and_tombstone() {
        let store = MemoryRoomStore::new();
        store
            .create_with_id("room".into(), sample_room("room"))
            .await
            .unwrap();

        let mut subscription = store.subscribe("room").await.unwrap();
        match subscription.recv().await {
            Some(RoomSignal::Snapshot(room)) => assert_eq!(room.state, RoomState::Waiting),
            other => panic!("expected initial snapshot, got {other:?}"),
        }

        store
            .update(
                "room",
                RoomPatch {
                    state: Some(RoomState::Starting),
                    ..RoomPatch::default()
                },
            )
            .await
            .unwrap();
        match subscription.recv().await {
            Some(RoomSignal::Snapshot(room)) => assert_eq!(room.state, RoomState::Starting),
            other => panic!("expected change snapshot, got {other:?}"),
        }

        store.delete("room").await.unwrap();
        assert!(matches!(
            subscription.recv().await,
            Some(RoomSignal::Deleted)
        ));
    }

    #[tokio::test]
    async fn query_filters_on_mode_and_state() {
        let store = MemoryRoomStore::new();
        store
            .create_with_id("open".into(), sample_room("open"))
            .await
            .unwrap();
        let mut private = sample_room("code");
        private.mode = RoomMode::Private;
        store.create_with_id("code".into(), private).await.unwrap();

        let waiting_public = store
            .query(RoomFilter {
                mode: Some(RoomMode::AutoMatch),
                state: Some(RoomState::Waiting),
            })
            .await
            .unwrap();
        assert_eq!(waiting_public.len(), 1);
        assert_eq!(waiting_public[0].id, "open");
    }
}
