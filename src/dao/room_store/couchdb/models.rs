use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::RoomEntity;

/// Key prefix namespacing room documents inside the shared database.
pub const ROOM_PREFIX: &str = "room::";

/// Compose the CouchDB document id for a room.
pub fn room_doc_id(id: &str) -> String {
    format!("{ROOM_PREFIX}{id}")
}

/// Envelope stored in CouchDB: the room body plus the `_id`/`_rev` pair the
/// server requires for optimistic replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    /// CouchDB document id ([`room_doc_id`] of the room id).
    #[serde(rename = "_id")]
    pub id: String,
    /// CouchDB revision, absent on first insert.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// The room document itself.
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl CouchRoomDocument {
    /// Wrap a room entity for insertion or replacement.
    pub fn from_entity(room: RoomEntity, rev: Option<String>) -> Self {
        Self {
            id: room_doc_id(&room.id),
            rev,
            room,
        }
    }
}

/// Response payload of a `_find` query.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    /// Matching documents, still as raw JSON values.
    pub docs: Vec<Value>,
}

/// One entry of a `_changes` response.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    /// Whether the document was deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Full document when `include_docs` was requested.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Response payload of a long-poll `_changes` request.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    /// Change rows since the requested sequence.
    pub results: Vec<ChangeRow>,
    /// Sequence to resume from.
    pub last_seq: Value,
}
