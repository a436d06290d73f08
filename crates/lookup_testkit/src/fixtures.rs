//! Store fixtures and scenario builders.
//!
//! Provides both stores wired into a service, with a counting cache and a
//! seeded principal directory, plus ready-made legacy dumps and snapshots.

use lookup_core::{InMemoryDirectory, MemoizedTableCache, NoProgress, Principal};
use lookup_migration::{DiffLog, DualWriteAdapter, MigrationReport};
use lookup_model::{OwnerType, Row, RowOwner, Table};
use lookup_storage::{Document, DocumentStore, InMemoryDocumentStore, SqliteStore};
use lookup_sync::LookupService;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Domain the seeded principals belong to.
pub const TEST_DOMAIN: &str = "demo";

/// Both stores, the cache and the directory behind one service.
pub struct TestStores {
    /// The legacy document store.
    pub legacy: Arc<InMemoryDocumentStore>,
    /// The cache the adapter invalidates.
    pub cache: Arc<MemoizedTableCache>,
    /// The principal directory.
    pub directory: Arc<InMemoryDirectory>,
    /// The service over both stores.
    pub service: LookupService,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStores {
    fn build(relational: SqliteStore, temp_dir: Option<TempDir>) -> Self {
        let legacy = Arc::new(InMemoryDocumentStore::new());
        let cache = Arc::new(MemoizedTableCache::new());
        let directory = Arc::new(seeded_directory());
        let adapter = DualWriteAdapter::new(legacy.clone(), Arc::new(relational))
            .with_cache(cache.clone());
        Self {
            service: LookupService::new(adapter, directory.clone()),
            legacy,
            cache,
            directory,
            _temp_dir: temp_dir,
        }
    }

    /// Creates stores with an in-memory relational database.
    pub fn memory() -> Self {
        let relational = SqliteStore::open_in_memory().expect("Failed to open in-memory database");
        Self::build(relational, None)
    }

    /// Creates stores with a relational database file in a temporary
    /// directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let relational =
            SqliteStore::open(&temp_dir.path().join("lookup.db")).expect("Failed to open database file");
        Self::build(relational, Some(temp_dir))
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn db_path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("lookup.db"))
    }

    /// The dual-write adapter.
    pub fn adapter(&self) -> &DualWriteAdapter {
        self.service.adapter()
    }

    /// Writes documents straight into the legacy store.
    pub fn load_legacy(&self, docs: Vec<Document>) {
        let outcomes = self.legacy.bulk_save(docs).expect("Failed to load legacy documents");
        assert!(outcomes.iter().all(|o| o.is_ok()), "legacy load rejected documents");
    }

    /// Migrates tables, rows and owners in order.
    pub fn migrate_all(&self) -> Vec<MigrationReport> {
        let mut log = DiffLog::in_memory();
        let adapter = self.adapter();
        vec![
            adapter
                .bulk_migrate::<Table>(&mut log, &NoProgress)
                .expect("Failed to migrate tables"),
            adapter
                .bulk_migrate::<Row>(&mut log, &NoProgress)
                .expect("Failed to migrate rows"),
            adapter
                .bulk_migrate::<RowOwner>(&mut log, &NoProgress)
                .expect("Failed to migrate owners"),
        ]
    }
}

impl std::ops::Deref for TestStores {
    type Target = LookupService;

    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

/// A directory with a few principals in [`TEST_DOMAIN`].
///
/// Two locations share the name `Springfield` and differ by site code.
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.add(TEST_DOMAIN, OwnerType::User, Principal::new("u-alice", "alice"));
    directory.add(TEST_DOMAIN, OwnerType::User, Principal::new("u-bob", "bob"));
    directory.add(TEST_DOMAIN, OwnerType::Group, Principal::new("g-nurses", "Nurses"));
    directory.add(
        TEST_DOMAIN,
        OwnerType::Location,
        Principal::new("l-boston", "Boston").with_alias("bos"),
    );
    directory.add(
        TEST_DOMAIN,
        OwnerType::Location,
        Principal::new("l-spr-ma", "Springfield").with_alias("spr-ma"),
    );
    directory.add(
        TEST_DOMAIN,
        OwnerType::Location,
        Principal::new("l-spr-il", "Springfield").with_alias("spr-il"),
    );
    directory
}

/// Runs a test with in-memory stores.
///
/// # Example
///
/// ```rust
/// use lookup_testkit::with_test_stores;
///
/// with_test_stores(|stores| {
///     assert!(stores.export("demo", &[]).unwrap().sheets[0].rows.is_empty());
/// });
/// ```
pub fn with_test_stores<F, R>(f: F) -> R
where
    F: FnOnce(&TestStores) -> R,
{
    let stores = TestStores::memory();
    f(&stores)
}

/// Scenario builders.
pub mod scenarios {
    use lookup_core::schema::{Workbook, Worksheet};
    use lookup_model::legacy::{OWNER_DOC_TYPE, ROW_DOC_TYPE, TABLE_DOC_TYPE};
    use lookup_model::{OwnerId, RowId, TableId};
    use lookup_storage::Document;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        Document::from_value(value).expect("Scenario documents carry an id and a type")
    }

    /// Builds a legacy dump of `tables` tables with `rows_per_table` rows
    /// each, one user owner per row.
    ///
    /// Even tables and rows use the current document shapes, odd ones the
    /// older shapes (bare field names, scalar field values, numeric
    /// attributes).
    pub fn legacy_dump(domain: &str, tables: usize, rows_per_table: usize) -> Vec<Document> {
        let mut docs = Vec::with_capacity(tables * (1 + 2 * rows_per_table));
        for t in 0..tables {
            let table_id = TableId::new().to_legacy();
            let fields = if t % 2 == 0 {
                json!([
                    {"field_name": "name", "properties": [], "is_indexed": true},
                    {"field_name": "label", "properties": ["lang"], "is_indexed": false},
                ])
            } else {
                json!(["name", "label"])
            };
            docs.push(doc(json!({
                "_id": table_id,
                "doc_type": TABLE_DOC_TYPE,
                "domain": domain,
                "tag": format!("table_{t}"),
                "fields": fields,
                "item_attributes": ["size"],
            })));

            for r in 0..rows_per_table {
                let row_id = RowId::new().to_legacy();
                let row_fields = if t % 2 == 0 {
                    json!({
                        "name": {"field_list": [{"field_value": format!("row {r}"), "properties": {}}]},
                        "label": {"field_list": [
                            {"field_value": format!("label {r}"), "properties": {"lang": "en"}},
                            {"field_value": format!("libellé {r}"), "properties": {"lang": "fr"}},
                        ]},
                    })
                } else {
                    json!({"name": format!("row {r}"), "label": r})
                };
                docs.push(doc(json!({
                    "_id": row_id,
                    "doc_type": ROW_DOC_TYPE,
                    "domain": domain,
                    "table_id": table_id,
                    "fields": row_fields,
                    "item_attributes": {"size": r * 10},
                    "sort_key": r,
                })));
                docs.push(doc(json!({
                    "_id": OwnerId::new().to_legacy(),
                    "doc_type": OWNER_DOC_TYPE,
                    "domain": domain,
                    "row_id": row_id,
                    "owner_type": "user",
                    "owner_id": "u-alice",
                })));
            }
        }
        docs
    }

    fn sheet(title: &str, rows: Value) -> Worksheet {
        Worksheet {
            title: title.to_string(),
            rows: serde_json::from_value(rows).expect("Scenario rows are objects"),
        }
    }

    /// A `states` table with a property field, an item attribute and two
    /// owned rows.
    pub fn states_snapshot() -> Workbook {
        Workbook::new()
            .with_sheet(sheet(
                "types",
                json!([{
                    "table_id": "states",
                    "field": ["name", "capital"],
                    "field 2": {"property": ["lang"]},
                    "property": ["code"],
                }]),
            ))
            .with_sheet(sheet(
                "states",
                json!([
                    {
                        "field": {"name": "Ohio", "capital": ["Columbus"]},
                        "capital": {"lang": ["en"]},
                        "property": {"code": "OH"},
                        "user": ["alice"],
                    },
                    {
                        "field": {"name": "Texas", "capital": ["Austin"]},
                        "capital": {"lang": ["en"]},
                        "property": {"code": "TX"},
                        "location": ["bos"],
                    },
                ]),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stores_have_a_path() {
        let stores = TestStores::file();
        assert!(stores.db_path().unwrap().exists());
        assert!(TestStores::memory().db_path().is_none());
    }

    #[test]
    fn legacy_dump_migrates_completely() {
        let stores = TestStores::memory();
        stores.load_legacy(scenarios::legacy_dump(TEST_DOMAIN, 2, 3));
        let reports = stores.migrate_all();
        assert_eq!(
            reports.iter().map(|r| r.created).collect::<Vec<_>>(),
            vec![2, 6, 6]
        );
        assert!(reports.iter().all(|r| r.failed == 0));
    }

    #[test]
    fn states_snapshot_imports_cleanly() {
        with_test_stores(|stores| {
            let result = stores
                .upload(
                    TEST_DOMAIN,
                    &scenarios::states_snapshot(),
                    &lookup_core::ImportConfig::new(),
                    &NoProgress,
                )
                .unwrap();
            assert!(result.success, "{:?}", result.errors);
            assert!(result.warnings.is_empty());
            assert_eq!(result.created, 2);
        });
    }
}
