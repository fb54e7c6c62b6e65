use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};
use tokio::{sync::mpsc, time::sleep};
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    models::{RoomEntity, RoomFilter, RoomPatch},
    room_store::{RoomSignal, RoomStore, RoomSubscription},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{ChangesResponse, CouchRoomDocument, FindResponse, room_doc_id},
};

/// How long a single `_changes` long-poll is allowed to hang open.
const CHANGES_POLL_TIMEOUT: Duration = Duration::from_secs(25);
/// Backoff bounds for the change-feed retry loop.
const FEED_RETRY_INITIAL: Duration = Duration::from_secs(1);
const FEED_RETRY_MAX: Duration = Duration::from_secs(10);

/// Room store backed by a CouchDB database, using `_find` for field queries
/// and per-document `_changes` long-polls for change subscriptions.
#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        let builder = self.client.request(method, url);
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);
        let mut builder = self.client.get(&url);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
        }

        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let mut builder = self.client.put(&url);
                if let Some((ref user, ref pass)) = self.auth {
                    builder = builder.basic_auth(user.as_ref(), Some(pass.as_ref()));
                }
                let create =
                    builder
                        .send()
                        .await
                        .map_err(|source| CouchDaoError::DatabaseCreate {
                            database: database.clone(),
                            source,
                        })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<StatusCode>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        Ok(response.status())
    }

    async fn insert_room(&self, room: RoomEntity) -> StorageResult<()> {
        let plain_id = room.id.clone();
        let doc_id = room_doc_id(&plain_id);
        let doc = CouchRoomDocument::from_entity(room, None);
        let status = self.put_document(&doc_id, &doc).await?;
        match status {
            StatusCode::CONFLICT => Err(StorageError::AlreadyExists { id: plain_id }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status: other,
            }
            .into()),
        }
    }

    /// One long-poll round of the change feed; returns the next sequence.
    async fn poll_changes(&self, doc_id: &str, since: &Value) -> CouchResult<ChangesResponse> {
        let path = "_changes";
        let response = self
            .request(Method::POST, path)
            .query(&[
                ("feed", "longpoll".to_string()),
                ("include_docs", "true".to_string()),
                ("filter", "_doc_ids".to_string()),
                ("since", since_param(since)),
                ("timeout", CHANGES_POLL_TIMEOUT.as_millis().to_string()),
            ])
            .json(&json!({ "doc_ids": [doc_id] }))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    /// Feed one room's change signals into `tx` until the document is deleted
    /// or the subscriber goes away.
    async fn run_change_feed(self, room_id: String, tx: mpsc::UnboundedSender<RoomSignal>) {
        let doc_id = room_doc_id(&room_id);
        let mut since = Value::String("now".into());
        let mut retry_delay = FEED_RETRY_INITIAL;

        loop {
            let response = match self.poll_changes(&doc_id, &since).await {
                Ok(response) => {
                    retry_delay = FEED_RETRY_INITIAL;
                    response
                }
                Err(err) => {
                    warn!(room_id = %room_id, error = %err, "room change feed poll failed");
                    sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(FEED_RETRY_MAX);
                    continue;
                }
            };

            since = response.last_seq;
            for row in response.results {
                if row.deleted {
                    let _ = tx.send(RoomSignal::Deleted);
                    return;
                }
                let Some(doc) = row.doc else {
                    continue;
                };
                match from_value::<CouchRoomDocument>(doc) {
                    Ok(document) => {
                        if tx.send(RoomSignal::Snapshot(document.room)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(room_id = %room_id, error = %err, "skipping undecodable change row");
                    }
                }
            }

            if tx.is_closed() {
                return;
            }
        }
    }
}

/// CouchDB accepts either a string or a numeric sequence token.
fn since_param(since: &Value) -> String {
    match since {
        Value::String(seq) => seq.clone(),
        other => other.to_string(),
    }
}

impl RoomStore for CouchRoomStore {
    fn create_auto(&self, mut room: RoomEntity) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let id = Uuid::new_v4().simple().to_string();
            room.id = id.clone();
            store.insert_room(room).await?;
            Ok(id)
        })
    }

    fn create_with_id(
        &self,
        id: String,
        mut room: RoomEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            room.id = id;
            store.insert_room(room).await
        })
    }

    fn find(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchRoomDocument>(&room_doc_id(&id))
                .await?;
            Ok(maybe_doc.map(|doc| doc.room))
        })
    }

    fn update(&self, id: &str, patch: RoomPatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&id);
            let Some(existing) = store.get_document::<CouchRoomDocument>(&doc_id).await? else {
                return Err(StorageError::NotFound { id });
            };

            let mut room = existing.room;
            patch.apply(&mut room);
            let doc = CouchRoomDocument::from_entity(room, existing.rev);

            let status = store.put_document(&doc_id, &doc).await?;
            if status.is_success() {
                Ok(())
            } else {
                // 409 included: a concurrent writer won the revision race and
                // the caller is expected to re-read before trying again.
                Err(CouchDaoError::RequestStatus {
                    path: doc_id,
                    status,
                }
                .into())
            }
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&id);
            let Some(existing) = store.get_document::<CouchRoomDocument>(&doc_id).await? else {
                return Ok(());
            };
            let Some(rev) = existing.rev else {
                return Ok(());
            };

            let response = store
                .request(Method::DELETE, &doc_id)
                .query(&[("rev", rev)])
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: doc_id.clone(),
                    source,
                })?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(()),
                status if status.is_success() => Ok(()),
                other => Err(CouchDaoError::RequestStatus {
                    path: doc_id,
                    status: other,
                }
                .into()),
            }
        })
    }

    fn query(&self, filter: RoomFilter) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let path = "_find";
            let mut selector = json!({ "_id": { "$gt": super::models::ROOM_PREFIX } });
            if let Some(mode) = filter.mode {
                selector["mode"] = serde_json::to_value(mode).unwrap_or(Value::Null);
            }
            if let Some(state) = filter.state {
                selector["state"] = serde_json::to_value(state).unwrap_or(Value::Null);
            }

            let response = store
                .request(Method::POST, path)
                .json(&json!({ "selector": selector }))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: path.to_string(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: path.to_string(),
                    status: response.status(),
                }
                .into());
            }

            let payload = response.json::<FindResponse>().await.map_err(|source| {
                CouchDaoError::DecodeResponse {
                    path: path.to_string(),
                    source,
                }
            })?;

            let mut rooms = Vec::with_capacity(payload.docs.len());
            for doc in payload.docs {
                let parsed: CouchRoomDocument =
                    from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                        path: path.to_string(),
                        source,
                    })?;
                rooms.push(parsed.room);
            }
            Ok(rooms)
        })
    }

    fn subscribe(&self, id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let Some(current) = store
                .get_document::<CouchRoomDocument>(&room_doc_id(&id))
                .await?
            else {
                return Err(StorageError::NotFound { id });
            };

            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(RoomSignal::Snapshot(current.room));
            let feeder = tokio::spawn(store.run_change_feed(id, tx));
            Ok(RoomSubscription::new(rx, Some(feeder.abort_handle())))
        })
    }
}
