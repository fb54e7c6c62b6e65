//! The narrow surface the UI layer calls, adapting controller events into a
//! subscribable room snapshot and a matchmaking-search indicator.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{
        models::RoomPatch,
        room_store::RoomStore,
        storage::StorageError,
    },
    error::ServiceError,
    oracle::AnswerOracle,
    services::{
        matchmaking,
        room_controller::{RoomController, SearchStatus},
    },
    state::room::{Room, UserIdentity},
};

/// Per-user session entry point: join/create/leave/submit plus the reactive
/// room snapshot. One active room at a time; the room subscription and every
/// pending timer are torn down on [`SessionFacade::leave`].
pub struct SessionFacade {
    store: Arc<dyn RoomStore>,
    oracle: AnswerOracle,
    config: Arc<AppConfig>,
    user: UserIdentity,
    snapshot_tx: watch::Sender<Option<Room>>,
    search_tx: watch::Sender<SearchStatus>,
    active: Mutex<Option<Arc<RoomController>>>,
}

impl SessionFacade {
    /// Build a facade for one signed-in user.
    pub fn new(
        store: Arc<dyn RoomStore>,
        oracle: AnswerOracle,
        config: Arc<AppConfig>,
        user: UserIdentity,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (search_tx, _) = watch::channel(SearchStatus::default());
        Self {
            store,
            oracle,
            config,
            user,
            snapshot_tx,
            search_tx,
            active: Mutex::new(None),
        }
    }

    /// Continuously-updated read-only room snapshot.
    pub fn room_updates(&self) -> watch::Receiver<Option<Room>> {
        self.snapshot_tx.subscribe()
    }

    /// The room snapshot as a stream, for reactive UI bindings.
    pub fn room_stream(&self) -> WatchStream<Option<Room>> {
        WatchStream::new(self.snapshot_tx.subscribe())
    }

    /// Latest room snapshot, if the user is in a room.
    pub fn current_room(&self) -> Option<Room> {
        self.snapshot_tx.borrow().clone()
    }

    /// "Searching, with remaining seconds" indicator.
    pub fn search_updates(&self) -> watch::Receiver<SearchStatus> {
        self.search_tx.subscribe()
    }

    /// Join an open auto-match room (or open a new one) and start the
    /// matchmaking countdown when seats remain open.
    pub async fn join_auto_match(&self) -> Result<String, ServiceError> {
        let mut active = self.active.lock().await;
        self.ensure_not_in_room(&active)?;

        let room_id = matchmaking::find_or_create_auto_room(self.store.as_ref(), &self.user).await?;
        let controller = self.attach(room_id.clone()).await?;
        *active = Some(Arc::clone(&controller));

        match self.store.find(&room_id).await? {
            Some(room) if room.is_full() => {
                controller
                    .begin_start(crate::state::state_machine::RoomEvent::SeatsFilled)
                    .await?;
            }
            Some(_) => controller.start_search_countdown(),
            None => {
                warn!(room_id = %room_id, "room vanished right after join");
            }
        }

        Ok(room_id)
    }

    /// Open a private room under a fresh invite code and wait for guests.
    pub async fn create_private_room(&self) -> Result<String, ServiceError> {
        let mut active = self.active.lock().await;
        self.ensure_not_in_room(&active)?;

        let room_id = matchmaking::create_private_room(self.store.as_ref(), &self.user).await?;
        let controller = self.attach(room_id.clone()).await?;
        *active = Some(controller);
        Ok(room_id)
    }

    /// Join a private room by invite code. Returns `false` when the room does
    /// not exist, is full, or has already started.
    pub async fn join_private_room(&self, room_id: &str) -> Result<bool, ServiceError> {
        let mut active = self.active.lock().await;
        self.ensure_not_in_room(&active)?;

        let Some(mut room) = self.store.find(room_id).await? else {
            return Ok(false);
        };

        if !room.has_player(&self.user.id) {
            if !room.state.accepts_joins() || room.is_full() {
                return Ok(false);
            }
            matchmaking::seat_player(&mut room, &self.user.id, &self.user.username, false, None)?;
            match self
                .store
                .update(
                    room_id,
                    RoomPatch {
                        players: Some(room.players.clone()),
                        teams: Some(room.teams.clone()),
                        ..RoomPatch::default()
                    },
                )
                .await
            {
                Ok(()) => {}
                Err(StorageError::NotFound { .. }) => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }

        let controller = self.attach(room_id.to_string()).await?;
        *active = Some(controller);
        Ok(true)
    }

    /// Start a joined private room; only its owner may do so.
    pub async fn start_private_room(&self, room_id: &str) -> Result<(), ServiceError> {
        let active = self.active.lock().await;
        let controller = active
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidState("join the room before starting it".into()))?;
        if controller.room_id() != room_id {
            return Err(ServiceError::InvalidState(format!(
                "not joined to room `{room_id}`"
            )));
        }
        controller.start_private().await
    }

    /// Submit the local user's answer for the current question.
    pub async fn submit_answer(&self, text: &str) -> Result<(), ServiceError> {
        let active = self.active.lock().await;
        let controller = active
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidState("not in a room".into()))?;
        controller.submit_answer(text).await
    }

    /// Leave the active room, tearing down the subscription and timers.
    /// A no-op when not in a room.
    pub async fn leave(&self) -> Result<(), ServiceError> {
        let controller = self.active.lock().await.take();
        match controller {
            Some(controller) => controller.leave().await,
            None => Ok(()),
        }
    }

    async fn attach(&self, room_id: String) -> Result<Arc<RoomController>, ServiceError> {
        RoomController::attach(
            Arc::clone(&self.store),
            self.oracle.clone(),
            Arc::clone(&self.config),
            self.user.clone(),
            room_id,
            self.snapshot_tx.clone(),
            self.search_tx.clone(),
        )
        .await
    }

    fn ensure_not_in_room(
        &self,
        active: &Option<Arc<RoomController>>,
    ) -> Result<(), ServiceError> {
        if active.is_some() {
            return Err(ServiceError::InvalidState(
                "already in a room; leave it first".into(),
            ));
        }
        Ok(())
    }
}
