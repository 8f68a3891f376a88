//! In-process document store.
//!
//! Each collection is a vector of documents behind its own tokio `RwLock`;
//! every update runs under the write lock so it is atomic with respect to
//! other writers. The whole store can be captured as a [`Snapshot`] and
//! written to disk between messages.

use crate::error::StoreError;
use crate::store::document::{Document, FieldPath, Filter, ID_FIELD, Update, project};
use crate::store::{ACTIONS, APPLICATIONS, Collection, DEVICES, DocumentStore, UpdateOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::debug;

pub struct MemoryCollection {
    name: String,
    docs: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    fn new(name: &str, docs: Vec<Document>) -> Self {
        Self {
            name: name.to_string(),
            docs: RwLock::new(docs),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Insert or wholly replace documents keyed by `_id`.
    pub async fn replace_all_by_id(&self, incoming: Vec<Document>) -> Result<usize, StoreError> {
        let mut docs = self.docs.write().await;
        for doc in &incoming {
            if !matches!(doc.get(ID_FIELD), Some(Value::String(_))) {
                return Err(StoreError::InvalidUpdate {
                    path: ID_FIELD.to_string(),
                    reason: format!("documents seeded into '{}' need a string id", self.name),
                });
            }
        }
        let count = incoming.len();
        for doc in incoming {
            let id = doc.get(ID_FIELD).cloned();
            match docs.iter_mut().find(|existing| existing.get(ID_FIELD) == id.as_ref()) {
                Some(existing) => *existing = doc,
                None => docs.push(doc),
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[FieldPath]>,
    ) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.iter().find(|doc| filter.matches(doc)).map(|doc| match projection {
            Some(fields) => project(doc, fields),
            None => doc.clone(),
        }))
    }

    async fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        if let Some(id) = doc.get(ID_FIELD) {
            if docs.iter().any(|existing| existing.get(ID_FIELD) == Some(id)) {
                return Err(StoreError::DuplicateKey(id.to_string()));
            }
        }
        docs.push(doc);
        Ok(())
    }

    async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut docs = self.docs.write().await;
        if let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) {
            update.apply(doc)?;
            return Ok(UpdateOutcome {
                matched: true,
                upserted: false,
            });
        }
        if !upsert {
            return Ok(UpdateOutcome::default());
        }
        let mut doc = filter.seed()?;
        update.apply(&mut doc)?;
        debug!(collection = %self.name, "upserted document");
        docs.push(doc);
        Ok(UpdateOutcome {
            matched: false,
            upserted: true,
        })
    }
}

/// Serialized form of every collection in a [`MemoryStore`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub collections: BTreeMap<String, Vec<Document>>,
}

impl Snapshot {
    /// Read a snapshot file; a missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading snapshot {}", path.display()));
            }
        };
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write the snapshot next to `path` and atomically move it into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("staging snapshot in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut staged, self)
            .with_context(|| format!("encoding snapshot for {}", path.display()))?;
        staged
            .as_file()
            .sync_all()
            .with_context(|| format!("flushing snapshot for {}", path.display()))?;
        staged
            .persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("replacing snapshot {}", path.display()))?;
        Ok(())
    }
}

/// Store holding the `applications`, `devices`, and `actions` collections.
#[derive(Clone)]
pub struct MemoryStore {
    collections: Arc<BTreeMap<String, Arc<MemoryCollection>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Rebuild a store from a snapshot. Collections the handler does not use
    /// are dropped; missing ones start empty.
    pub fn from_snapshot(mut snapshot: Snapshot) -> Self {
        let collections = [APPLICATIONS, DEVICES, ACTIONS]
            .into_iter()
            .map(|name| {
                let docs = snapshot.collections.remove(name).unwrap_or_default();
                (name.to_string(), Arc::new(MemoryCollection::new(name, docs)))
            })
            .collect();
        Self {
            collections: Arc::new(collections),
        }
    }

    /// Open the store persisted at `path`, or an empty one if nothing is there yet.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = Snapshot::load(path)?.unwrap_or_default();
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn snapshot(&self) -> Snapshot {
        let mut collections = BTreeMap::new();
        for (name, collection) in self.collections.iter() {
            collections.insert(name.clone(), collection.docs.read().await.clone());
        }
        Snapshot { collections }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        snapshot.write(path)?;
        debug!(path = %path.display(), "wrote store snapshot");
        Ok(())
    }

    pub fn memory_collection(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(name).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        match self.collections.get(name) {
            Some(collection) => Ok(collection.clone() as Arc<dyn Collection>),
            None => Err(StoreError::CollectionUnavailable(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_collection_is_unavailable() {
        let store = MemoryStore::new();
        let err = store.collection("sessions").await.err();
        assert_eq!(err, Some(StoreError::CollectionUnavailable("sessions".into())));
    }

    #[tokio::test]
    async fn upsert_creates_document_from_filter() {
        let store = MemoryStore::new();
        let devices = store.collection(DEVICES).await.unwrap();
        let outcome = devices
            .update_one(
                &Filter::by_id("dev-1"),
                &Update::new().set(FieldPath::parse("deviceName"), "kitchen"),
                true,
            )
            .await
            .unwrap();
        assert!(outcome.upserted);
        let found = devices.find_one(&Filter::by_id("dev-1"), None).await.unwrap();
        assert_eq!(
            found.map(Value::Object),
            Some(json!({ "_id": "dev-1", "deviceName": "kitchen" }))
        );
    }

    #[tokio::test]
    async fn update_without_upsert_skips_missing_document() {
        let store = MemoryStore::new();
        let devices = store.collection(DEVICES).await.unwrap();
        let outcome = devices
            .update_one(
                &Filter::by_id("dev-1"),
                &Update::new().unset(FieldPath::new(["apps", "tc-1"])),
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert!(store.memory_collection(DEVICES).unwrap().is_empty().await);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let apps = store.collection(APPLICATIONS).await.unwrap();
        apps.insert_one(doc(json!({ "_id": "tc-1" }))).await.unwrap();
        let err = apps.insert_one(doc(json!({ "_id": "tc-1" }))).await;
        assert!(matches!(err, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state/store.json");
        let store = MemoryStore::new();
        store
            .memory_collection(APPLICATIONS)
            .unwrap()
            .replace_all_by_id(vec![doc(json!({ "_id": "tc-1", "name": "Thermostat" }))])
            .await?;
        store.save(&path).await?;

        let reopened = MemoryStore::open(&path)?;
        assert_eq!(reopened.snapshot().await, store.snapshot().await);
        Ok(())
    }

    #[test]
    fn missing_snapshot_opens_empty() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(Snapshot::load(&dir.path().join("absent.json"))?.is_none());
        Ok(())
    }
}
