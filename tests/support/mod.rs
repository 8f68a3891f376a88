#![allow(dead_code)]

// Shared fixtures: a handler wired to an in-memory store with a fixed clock,
// fixed challenges, and a seeded application catalog.

use anyhow::{Context, Result};
use async_trait::async_trait;
use devpair::store::{ACTIONS, APPLICATIONS, DEVICES, Document, FieldPath, Filter, Update, UpdateOutcome};
use devpair::{
    ChallengeSource, Clock, Collection, Config, DocumentStore, MemoryStore, PairingHandler,
    StoreError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const NOW: u64 = 1_700_000_000_000;
pub const DEVICE: &str = "dev-kitchen";
pub const THERMOSTAT: &str = "tc-thermostat";
pub const LOCK: &str = "tc-lock";
pub const BROKEN: &str = "tc-broken";

pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn at(ms: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(ms)))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct FixedChallenges {
    code: AtomicU64,
}

impl FixedChallenges {
    pub fn issuing(code: u64) -> Arc<Self> {
        Arc::new(Self {
            code: AtomicU64::new(code),
        })
    }

    pub fn set_code(&self, code: u64) {
        self.code.store(code, Ordering::SeqCst);
    }
}

impl ChallengeSource for FixedChallenges {
    fn verification_code(&self) -> u64 {
        self.code.load(Ordering::SeqCst)
    }

    fn nonce(&self) -> u32 {
        0xDEAD_BEEF
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
    Unavailable,
    FailingInserts,
    FailingUpdates,
    /// Updates report no match and change nothing.
    UnmatchedUpdates,
}

/// Store wrapper that injects one fault into one collection and delegates
/// everything else.
pub struct FailingStore {
    inner: MemoryStore,
    collection: &'static str,
    fault: Fault,
}

impl FailingStore {
    fn new(inner: MemoryStore, collection: &'static str, fault: Fault) -> Self {
        Self {
            inner,
            collection,
            fault,
        }
    }

    pub fn unavailable(inner: MemoryStore, collection: &'static str) -> Self {
        Self::new(inner, collection, Fault::Unavailable)
    }

    pub fn failing_inserts(inner: MemoryStore, collection: &'static str) -> Self {
        Self::new(inner, collection, Fault::FailingInserts)
    }

    pub fn failing_updates(inner: MemoryStore, collection: &'static str) -> Self {
        Self::new(inner, collection, Fault::FailingUpdates)
    }

    pub fn unmatched_updates(inner: MemoryStore, collection: &'static str) -> Self {
        Self::new(inner, collection, Fault::UnmatchedUpdates)
    }
}

struct FaultyCollection {
    inner: Arc<dyn Collection>,
    fault: Fault,
}

#[async_trait]
impl Collection for FaultyCollection {
    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[FieldPath]>,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(filter, projection).await
    }

    async fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        if self.fault == Fault::FailingInserts {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.insert_one(doc).await
    }

    async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        match self.fault {
            Fault::FailingUpdates => Err(StoreError::Backend("write conflict".into())),
            Fault::UnmatchedUpdates if !upsert => Ok(UpdateOutcome::default()),
            _ => self.inner.update_one(filter, update, upsert).await,
        }
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        if name != self.collection {
            return self.inner.collection(name).await;
        }
        if self.fault == Fault::Unavailable {
            return Err(StoreError::CollectionUnavailable(name.to_string()));
        }
        Ok(Arc::new(FaultyCollection {
            inner: self.inner.collection(name).await?,
            fault: self.fault,
        }))
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub challenges: Arc<FixedChallenges>,
    pub handler: PairingHandler,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        let store = MemoryStore::new();
        Self::build(store.clone(), Arc::new(store)).await
    }

    /// Handler reading and writing through `backend`, which must wrap `store`.
    pub async fn build(store: MemoryStore, backend: Arc<dyn DocumentStore>) -> Result<Self> {
        seed_catalog(&store).await?;
        let clock = FixedClock::at(NOW);
        let challenges = FixedChallenges::issuing(42);
        let handler = PairingHandler::new(backend, &Config::default())?
            .with_clock(clock.clone())
            .with_challenges(challenges.clone());
        Ok(Self {
            store,
            clock,
            challenges,
            handler,
        })
    }

    pub async fn send(&self, message: Value) -> Value {
        self.handler.handle(&message).await
    }

    pub async fn device(&self, id: &str) -> Option<Value> {
        self.collection(DEVICES)
            .await
            .into_iter()
            .find(|doc| doc.get("_id").and_then(Value::as_str) == Some(id))
    }

    pub async fn actions(&self) -> Vec<Value> {
        self.collection(ACTIONS).await
    }

    async fn collection(&self, name: &str) -> Vec<Value> {
        self.store
            .snapshot()
            .await
            .collections
            .remove(name)
            .unwrap_or_default()
            .into_iter()
            .map(Value::Object)
            .collect()
    }
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub async fn seed_catalog(store: &MemoryStore) -> Result<()> {
    store
        .memory_collection(APPLICATIONS)
        .context("applications collection")?
        .replace_all_by_id(vec![
            doc(json!({ "_id": THERMOSTAT, "name": "Thermostat", "version": { "major": 1, "minor": 4 } })),
            doc(json!({ "_id": LOCK, "name": "Door Lock", "version": { "major": 2, "minor": 0 } })),
            doc(json!({ "_id": BROKEN, "name": "Broken" })),
        ])
        .await?;
    Ok(())
}

pub fn message(kind: &str, tokencard_id: &str, request_id: &str, body: Value) -> Value {
    json!({
        "header": {
            "requestId": request_id,
            "deviceId": DEVICE,
            "type": kind,
            "timestamp": NOW,
            "ttl": 60,
            "encryption": { "method": "aes-256", "tokencardId": tokencard_id }
        },
        "body": body
    })
}

pub fn register(tokencard_id: &str, request_id: &str) -> Value {
    message(
        "register",
        tokencard_id,
        request_id,
        json!({ "name": "Thermostat", "product": "HVAC-1" }),
    )
}

pub fn verify(tokencard_id: &str, request_id: &str, register_request: &str, codes: Value) -> Value {
    message(
        "verify",
        tokencard_id,
        request_id,
        json!({ "requestId": register_request, "verificationCode": codes }),
    )
}

pub fn unregister(tokencard_id: &str, request_id: &str) -> Value {
    message("unregister", tokencard_id, request_id, json!({}))
}

pub fn error_code(reply: &Value) -> Option<u64> {
    reply.get("errorCode").and_then(Value::as_u64)
}
