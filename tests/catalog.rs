// Catalog seed file guard rails: id rules, malformed entries, and lookups
// through the seeded applications collection.

use anyhow::Result;
use devpair::store::APPLICATIONS;
use devpair::{ApplicationCatalog, DocumentStore, MemoryStore, SchemaSet, load_catalog_file};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write_catalog(dir: &TempDir, contents: serde_json::Value) -> Result<std::path::PathBuf> {
    let path = dir.path().join("applications.json");
    fs::write(&path, serde_json::to_vec_pretty(&contents)?)?;
    Ok(path)
}

#[tokio::test]
async fn seeded_entries_resolve_to_name_and_version() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_catalog(
        &dir,
        json!({ "applications": [
            { "_id": "tc-1", "name": "Thermostat", "version": { "major": 1, "minor": 2 }, "vendor": "acme" },
            { "_id": "tc-2", "name": "Broken" }
        ]}),
    )?;
    let schemas = SchemaSet::compile()?;
    let entries = load_catalog_file(&path, &schemas)?;
    assert_eq!(entries.len(), 2, "malformed entries are kept");

    let store = MemoryStore::new();
    store
        .memory_collection(APPLICATIONS)
        .expect("applications collection")
        .replace_all_by_id(entries)
        .await?;
    let catalog = ApplicationCatalog::new(Arc::new(store) as Arc<dyn DocumentStore>);

    assert_eq!(
        catalog.find("tc-1").await?,
        Some(json!({ "name": "Thermostat", "version": { "major": 1, "minor": 2 } }))
    );
    assert_eq!(catalog.find("tc-2").await?, Some(json!({ "name": "Broken" })));
    assert_eq!(catalog.find("tc-3").await?, None);
    Ok(())
}

#[test]
fn duplicate_ids_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_catalog(
        &dir,
        json!({ "applications": [
            { "_id": "tc-1", "name": "A", "version": { "major": 1, "minor": 0 } },
            { "_id": "tc-1", "name": "B", "version": { "major": 1, "minor": 0 } }
        ]}),
    )?;
    let err = load_catalog_file(&path, &SchemaSet::compile()?).unwrap_err();
    assert!(format!("{err:#}").contains("twice"), "unexpected error: {err:#}");
    Ok(())
}

#[test]
fn entries_need_string_ids() -> Result<()> {
    let dir = TempDir::new()?;
    for applications in [json!([{ "name": "A" }]), json!([{ "_id": 7 }]), json!([{ "_id": " " }])] {
        let path = write_catalog(&dir, json!({ "applications": applications }))?;
        assert!(load_catalog_file(&path, &SchemaSet::compile()?).is_err());
    }
    Ok(())
}

#[test]
fn missing_file_reports_path() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("absent.json");
    let err = load_catalog_file(&path, &SchemaSet::compile()?).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
    Ok(())
}
