#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::future::BoxFuture;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::dao::{
    models::{RoomEntity, RoomFilter, RoomPatch},
    storage::StorageResult,
};

/// Change notification delivered to a room subscriber.
#[derive(Debug, Clone)]
pub enum RoomSignal {
    /// Full current document, sent once on subscribe and after every change.
    Snapshot(RoomEntity),
    /// The document was deleted.
    Deleted,
}

/// Live handle onto one room document's change feed.
///
/// Dropping the handle unsubscribes: any backend feeder task is aborted and
/// the sending side observes the closed channel on its next delivery.
#[derive(Debug)]
pub struct RoomSubscription {
    receiver: mpsc::UnboundedReceiver<RoomSignal>,
    feeder: Option<AbortHandle>,
}

impl RoomSubscription {
    /// Wrap a signal channel, optionally tying a feeder task's lifetime to it.
    pub fn new(receiver: mpsc::UnboundedReceiver<RoomSignal>, feeder: Option<AbortHandle>) -> Self {
        Self { receiver, feeder }
    }

    /// Receive the next signal; `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<RoomSignal> {
        self.receiver.recv().await
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

/// Abstraction over the persistence layer for room documents.
///
/// All room reads used for decision-making must be re-fetched through
/// [`RoomStore::find`] immediately before composing an update; the store only
/// guarantees last-write-wins on whole fields.
pub trait RoomStore: Send + Sync {
    /// Persist a new room under a store-generated identifier and return it.
    fn create_auto(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<String>>;
    /// Persist a new room under an explicit identifier, failing when taken.
    fn create_with_id(
        &self,
        id: String,
        room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch the freshest copy of a room document.
    fn find(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Replace the patched fields of a room document, failing when the room
    /// was deleted concurrently.
    fn update(&self, id: &str, patch: RoomPatch) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a room document; succeeds when it is already gone.
    fn delete(&self, id: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch every room matching the field-equality filter.
    fn query(&self, filter: RoomFilter) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Subscribe to one room's change feed; the current document is delivered
    /// immediately and a tombstone on deletion.
    fn subscribe(&self, id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>>;
}
