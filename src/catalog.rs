//! Application catalog: read-only lookup of known token card ids.
//!
//! Entries live in the `applications` collection keyed by token card id. The
//! catalog is seeded at startup from a JSON file of the form
//! `{"applications": [{"_id": "...", "name": "...", "version": {...}}]}`.

use crate::error::{PairingError, Result, StoreOp};
use crate::schema::{SchemaSet, Shape};
use crate::store::{APPLICATIONS, Document, DocumentStore, FieldPath, Filter, ID_FIELD};
use anyhow::{Context, bail};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub struct ApplicationCatalog {
    store: Arc<dyn DocumentStore>,
}

impl ApplicationCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Look up the raw `name`/`version` projection of an entry.
    ///
    /// The result is not shape-checked here; callers validate it so a
    /// malformed entry surfaces as a validation failure, not a missing one.
    pub async fn find(&self, tokencard_id: &str) -> Result<Option<Value>> {
        let applications = self
            .store
            .collection(APPLICATIONS)
            .await
            .map_err(PairingError::persistence(StoreOp::CollectionAccess))?;
        let entry = applications
            .find_one(
                &Filter::by_id(tokencard_id),
                Some(&[FieldPath::parse("name"), FieldPath::parse("version")]),
            )
            .await
            .map_err(PairingError::persistence(StoreOp::Lookup))?;
        Ok(entry.map(Value::Object))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    applications: Vec<Document>,
}

/// Read a catalog seed file.
///
/// Every entry needs a unique, non-empty string `_id`. Entries that do not
/// match the catalog entry shape are kept but reported, since lookups of
/// them fail with a validation error rather than "not found".
pub fn load_catalog_file(path: &Path, schemas: &SchemaSet) -> anyhow::Result<Vec<Document>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
    let file: CatalogFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing catalog {}", path.display()))?;

    let mut seen = BTreeSet::new();
    for entry in &file.applications {
        let Some(id) = entry.get(ID_FIELD).and_then(Value::as_str) else {
            bail!("catalog {} has an entry without a string _id", path.display());
        };
        if id.trim().is_empty() {
            bail!("catalog {} has an entry with an empty _id", path.display());
        }
        if !seen.insert(id.to_string()) {
            bail!("catalog {} lists application {id} twice", path.display());
        }
        let verdict = schemas.validate(Shape::CatalogEntry, &Value::Object(entry.clone()));
        if !verdict.is_valid() {
            warn!(
                application = id,
                violations = verdict.errors().len(),
                "catalog entry does not match the catalog entry shape"
            );
        }
    }
    Ok(file.applications)
}
