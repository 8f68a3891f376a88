//! Document store seam.
//!
//! The handler only needs point lookups, single-document partial updates
//! (optionally upserting), and inserts. Backends implement [`DocumentStore`]
//! and hand out [`Collection`]s by name.

pub mod document;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

pub use document::{Document, FieldPath, Filter, ID_FIELD, Update};
pub use memory::{MemoryStore, Snapshot};

pub const APPLICATIONS: &str = "applications";
pub const DEVICES: &str = "devices";
pub const ACTIONS: &str = "actions";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: bool,
    pub upserted: bool,
}

#[async_trait]
pub trait Collection: Send + Sync {
    /// First document matching `filter`, reduced to `projection` when given.
    async fn find_one(
        &self,
        filter: &Filter,
        projection: Option<&[FieldPath]>,
    ) -> Result<Option<Document>, StoreError>;

    async fn insert_one(&self, doc: Document) -> Result<(), StoreError>;

    /// Apply `update` atomically to the first document matching `filter`.
    /// With `upsert`, a missing document is created from the filter's
    /// equality fields before the update is applied.
    async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError>;
}
