//! JSON document database kept in a single remote file.
//!
//! The whole database is one JSON object (`db.json`) holding the `quotes`,
//! `users` and `oracle_responses` collections together with `analytics`,
//! `settings` and `metadata` sections. [`DocumentStore`] caches the parsed
//! document for a freshness window and performs single-item mutations as
//! read-modify-write cycles against the remote file.
//!
//! Reads fail open: when the remote cannot be read the last good snapshot is
//! served, or the empty skeleton if there is none. Mutations never run
//! against such a fallback. They load strictly, and the outcome of the write
//! depends on the configured [`WritePolicy`].

mod filter;
mod remote;

pub use filter::Filter;
pub use remote::{ContentsApi, GithubContents, MemoryContents, RemoteError, RemoteFile};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{GithubConfig, WritePolicy};
use crate::model::Id;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("document is not valid JSON: {0}")]
    Decode(String),

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("no item with id {id} in {collection}")]
    NotFound { collection: &'static str, id: Id },

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("write rejected after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("invalid item: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Quotes,
    Users,
    OracleResponses,
}

impl Collection {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Collection::Quotes => "quotes",
            Collection::Users => "users",
            Collection::OracleResponses => "oracle_responses",
        }
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The parsed database. Unknown top-level keys survive a read-write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// The empty database written on first use.
    #[must_use]
    pub fn skeleton() -> Self {
        let now = now_stamp();
        let value = json!({
            "quotes": [],
            "users": [],
            "oracle_responses": [],
            "analytics": {
                "total_quotes": 0,
                "total_users": 0,
                "total_oracle_requests": 0,
                "popular_categories": {
                    "quantum": 0,
                    "network": 0,
                    "metaphysical": 0,
                    "systems": 0
                },
                "last_updated": now
            },
            "settings": {
                "site_name": "DarlingX",
                "site_description": "Your favourite",
                "maintenance_mode": false,
                "allow_registration": true,
                "require_approval": false,
                "max_quotes_per_user": 10,
                "rate_limit": {
                    "quotes_per_hour": 5,
                    "oracle_requests_per_hour": 10
                }
            },
            "metadata": {
                "version": "1.0.0",
                "last_backup": now,
                "created_at": now,
                "updated_at": now
            }
        });
        match value {
            Value::Object(map) => Document(map),
            _ => Document(Map::new()),
        }
    }

    /// Parse raw file content.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Decode`] unless the content is a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(Document(map)),
            Ok(_) => Err(DocumentError::Decode("top level is not an object".into())),
            Err(e) => Err(DocumentError::Decode(e.to_string())),
        }
    }

    /// Pretty-printed JSON, the layout the file has always used.
    pub fn to_vec(&self) -> Result<Vec<u8>, DocumentError> {
        serde_json::to_vec_pretty(&self.0).map_err(DocumentError::Encode)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn items(&self, collection: Collection) -> &[Value] {
        match self.0.get(collection.key()) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Mutable access to a collection, creating it if absent or malformed.
    pub fn items_mut(&mut self, collection: Collection) -> &mut Vec<Value> {
        let slot = self
            .0
            .entry(collection.key())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items,
            _ => unreachable!("slot was just replaced by an array"),
        }
    }

    /// Object section such as `settings`, created if absent.
    pub fn section_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just replaced by an object"),
        }
    }

    #[must_use]
    pub fn section(&self, key: &str) -> Value {
        self.0
            .get(key)
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Largest `id` in the collection, 0 when empty.
    #[must_use]
    pub fn max_id(&self, collection: Collection) -> Id {
        self.items(collection)
            .iter()
            .filter_map(|item| item.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn find_by_id(&self, collection: Collection, id: Id) -> Option<&Value> {
        self.items(collection)
            .iter()
            .find(|item| item.get("id").and_then(Value::as_i64) == Some(id))
    }

    /// Append `item` with the next id and fresh timestamps. Returns the stored item.
    pub fn add(&mut self, collection: Collection, item: Value) -> Result<Value, DocumentError> {
        let Value::Object(mut fields) = item else {
            return Err(DocumentError::Invalid("item must be a JSON object".into()));
        };
        let id = self.max_id(collection) + 1;
        let now = now_stamp();
        fields.insert("id".into(), Value::from(id));
        fields.insert("createdAt".into(), Value::from(now.clone()));
        fields.insert("updatedAt".into(), Value::from(now));
        let stored = Value::Object(fields);
        self.items_mut(collection).push(stored.clone());
        Ok(stored)
    }

    /// Shallow-merge `updates` into the item with `id`. The id itself is kept.
    pub fn update(
        &mut self,
        collection: Collection,
        id: Id,
        mut updates: Map<String, Value>,
    ) -> Result<Value, DocumentError> {
        updates.remove("id");
        let item = self
            .items_mut(collection)
            .iter_mut()
            .find(|item| item.get("id").and_then(Value::as_i64) == Some(id))
            .ok_or(DocumentError::NotFound {
                collection: collection.key(),
                id,
            })?;
        if let Value::Object(fields) = item {
            fields.extend(updates);
            fields.insert("updatedAt".into(), Value::from(now_stamp()));
        }
        Ok(item.clone())
    }

    pub fn remove(&mut self, collection: Collection, id: Id) -> Result<(), DocumentError> {
        let items = self.items_mut(collection);
        let index = items
            .iter()
            .position(|item| item.get("id").and_then(Value::as_i64) == Some(id))
            .ok_or(DocumentError::NotFound {
                collection: collection.key(),
                id,
            })?;
        items.remove(index);
        Ok(())
    }

    /// Refresh `metadata` timestamps and the `analytics` totals before a save.
    fn stamp(&mut self) {
        let now = now_stamp();
        let quotes = self.items(Collection::Quotes).len();
        let users = self.items(Collection::Users).len();
        let oracle = self.items(Collection::OracleResponses).len();
        let metadata = self.section_mut("metadata");
        metadata.insert("updated_at".into(), Value::from(now.clone()));
        metadata.insert("last_backup".into(), Value::from(now.clone()));
        let analytics = self.section_mut("analytics");
        analytics.insert("total_quotes".into(), Value::from(quotes));
        analytics.insert("total_users".into(), Value::from(users));
        analytics.insert("total_oracle_requests".into(), Value::from(oracle));
        analytics.insert("last_updated".into(), Value::from(now));
    }
}

struct Snapshot {
    doc: Document,
    sha: Option<String>,
    fetched_at: Instant,
}

/// Stale snapshot or the empty skeleton.
fn fallback(stale: Option<&Snapshot>) -> Document {
    stale.map_or_else(Document::skeleton, |snapshot| snapshot.doc.clone())
}

/// After a failed read, stale reads skip the remote for this long.
const READ_RETRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Cache {
    snapshot: Option<Snapshot>,
    read_failed_at: Option<Instant>,
}

/// Handle to the remote document with its cache and revision token.
pub struct DocumentStore {
    remote: Arc<dyn ContentsApi>,
    ttl: Duration,
    policy: WritePolicy,
    max_attempts: u32,
    cache: Mutex<Cache>,
}

impl DocumentStore {
    pub fn new(remote: Arc<dyn ContentsApi>, cfg: &GithubConfig) -> Self {
        Self {
            remote,
            ttl: Duration::from_secs(cfg.cache_ttl_secs),
            policy: cfg.write_policy,
            max_attempts: cfg.max_write_attempts.max(1),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Build the store configured by `cfg`: the GitHub contents API when a
    /// token is set, otherwise an in-process file.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(cfg: &GithubConfig) -> Result<Self, DocumentError> {
        let remote: Arc<dyn ContentsApi> = match cfg.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Arc::new(GithubContents::new(cfg, token)?),
            None => {
                tracing::warn!("no GitHub token configured, document is kept in memory only");
                Arc::new(MemoryContents::new())
            }
        };
        Ok(Self::new(remote, cfg))
    }

    #[must_use]
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    async fn read_remote(&self) -> Result<(Document, Option<String>), DocumentError> {
        match self.remote.get().await {
            Ok(file) => Ok((Document::from_slice(&file.content)?, Some(file.sha))),
            Err(RemoteError::NotFound) => {
                tracing::info!("remote document missing, starting from an empty skeleton");
                Ok((Document::skeleton(), None))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fresh snapshot in `slot`, reading the remote if it is stale or absent.
    async fn load<'a>(
        &self,
        slot: &'a mut Option<Snapshot>,
    ) -> Result<&'a mut Snapshot, DocumentError> {
        let fresh = slot
            .as_ref()
            .is_some_and(|s| s.fetched_at.elapsed() < self.ttl);
        if !fresh {
            let (doc, sha) = self.read_remote().await?;
            tracing::debug!(sha = sha.as_deref().unwrap_or("-"), "document loaded");
            *slot = Some(Snapshot {
                doc,
                sha,
                fetched_at: Instant::now(),
            });
        }
        slot.as_mut()
            .ok_or_else(|| DocumentError::Invalid("snapshot missing after load".into()))
    }

    /// Current document, served from cache within the freshness window.
    ///
    /// Never fails: on a read error the previous snapshot or the skeleton is
    /// returned, and for a short back-off afterwards stale reads are
    /// answered the same way without contacting the remote.
    #[tracing::instrument(skip_all)]
    pub async fn fetch(&self) -> Document {
        let mut guard = self.cache.lock().await;
        let cache = &mut *guard;
        let fresh = cache
            .snapshot
            .as_ref()
            .is_some_and(|s| s.fetched_at.elapsed() < self.ttl);
        let backing_off = cache
            .read_failed_at
            .is_some_and(|at| at.elapsed() < READ_RETRY_BACKOFF);
        if !fresh && backing_off {
            tracing::debug!("remote read failed recently, serving fallback");
            return fallback(cache.snapshot.as_ref());
        }
        match self.load(&mut cache.snapshot).await {
            Ok(snapshot) => {
                let doc = snapshot.doc.clone();
                cache.read_failed_at = None;
                doc
            }
            Err(e) => {
                cache.read_failed_at = Some(Instant::now());
                tracing::warn!(
                    error = %e,
                    cached = cache.snapshot.is_some(),
                    "document read failed, serving fallback"
                );
                fallback(cache.snapshot.as_ref())
            }
        }
    }

    /// Revision token to send with a write of the snapshot `snapshot_sha`.
    async fn revision_for_write(
        &self,
        snapshot_sha: Option<String>,
    ) -> Result<Option<String>, DocumentError> {
        match self.policy {
            WritePolicy::CheckRevision => Ok(snapshot_sha),
            WritePolicy::Overwrite => match self.remote.get().await {
                Ok(file) => Ok(Some(file.sha)),
                Err(RemoteError::NotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn write(
        &self,
        slot: &mut Option<Snapshot>,
        mut doc: Document,
        base_sha: Option<String>,
    ) -> Result<(), DocumentError> {
        doc.stamp();
        let bytes = doc.to_vec()?;
        let sha = self.revision_for_write(base_sha).await?;
        let message = format!("Update database - {}", now_stamp());
        let new_sha = self.remote.put(&bytes, sha.as_deref(), &message).await?;
        tracing::info!(sha = %new_sha, "document saved");
        *slot = Some(Snapshot {
            doc,
            sha: Some(new_sha),
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    /// Apply `change` to the current document and write it back.
    ///
    /// Under [`WritePolicy::CheckRevision`] a stale revision drops the cache,
    /// re-reads the document and re-applies `change`, so `change` may run
    /// more than once. The cache is only replaced after a successful write.
    #[tracing::instrument(skip_all)]
    pub async fn mutate<T, F>(&self, mut change: F) -> Result<T, DocumentError>
    where
        F: FnMut(&mut Document) -> Result<T, DocumentError> + Send,
        T: Send,
    {
        let mut cache = self.cache.lock().await;
        let slot = &mut cache.snapshot;
        for attempt in 1..=self.max_attempts {
            let snapshot = self.load(slot).await?;
            let mut doc = snapshot.doc.clone();
            let base_sha = snapshot.sha.clone();
            let out = change(&mut doc)?;
            match self.write(slot, doc, base_sha).await {
                Ok(()) => return Ok(out),
                Err(DocumentError::Remote(RemoteError::Conflict))
                    if self.policy == WritePolicy::CheckRevision =>
                {
                    tracing::warn!(attempt, "document changed remotely, retrying write");
                    *slot = None;
                }
                Err(DocumentError::Remote(RemoteError::Conflict)) => {
                    return Err(DocumentError::Conflict { attempts: attempt });
                }
                Err(e) => return Err(e),
            }
        }
        Err(DocumentError::Conflict {
            attempts: self.max_attempts,
        })
    }

    /// Replace the whole document.
    ///
    /// The write is based on the cached revision and is not retried.
    #[tracing::instrument(skip_all)]
    pub async fn save(&self, doc: Document) -> Result<(), DocumentError> {
        let mut cache = self.cache.lock().await;
        let slot = &mut cache.snapshot;
        let base_sha = self.load(slot).await?.sha.clone();
        match self.write(slot, doc, base_sha).await {
            Err(DocumentError::Remote(RemoteError::Conflict)) => {
                *slot = None;
                Err(DocumentError::Conflict { attempts: 1 })
            }
            other => other,
        }
    }

    pub async fn add_to_collection(
        &self,
        collection: Collection,
        item: Value,
    ) -> Result<Value, DocumentError> {
        self.mutate(|doc| doc.add(collection, item.clone())).await
    }

    pub async fn update_in_collection(
        &self,
        collection: Collection,
        id: Id,
        updates: Map<String, Value>,
    ) -> Result<Value, DocumentError> {
        self.mutate(|doc| doc.update(collection, id, updates.clone()))
            .await
    }

    pub async fn remove_from_collection(
        &self,
        collection: Collection,
        id: Id,
    ) -> Result<(), DocumentError> {
        self.mutate(|doc| doc.remove(collection, id)).await
    }

    pub async fn find_in_collection(&self, collection: Collection, filter: &Filter) -> Vec<Value> {
        let doc = self.fetch().await;
        doc.items(collection)
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub async fn find_by_id(&self, collection: Collection, id: Id) -> Option<Value> {
        self.fetch().await.find_by_id(collection, id).cloned()
    }

    pub async fn settings(&self) -> Value {
        self.fetch().await.section("settings")
    }

    /// Shallow-merge `updates` into `settings` and return the result.
    pub async fn update_settings(&self, updates: Map<String, Value>) -> Result<Value, DocumentError> {
        self.mutate(|doc| {
            doc.section_mut("settings").extend(updates.clone());
            Ok(doc.section("settings"))
        })
        .await
    }

    pub async fn analytics(&self) -> Value {
        self.fetch().await.section("analytics")
    }

    pub async fn clear_cache(&self) {
        *self.cache.lock().await = Cache::default();
        tracing::info!("document cache cleared");
    }

    /// Read the remote once, bypassing the cache. A missing file is fine.
    pub async fn test_connection(&self) -> Result<(), DocumentError> {
        self.read_remote().await.map(|_| ())
    }
}
