//! Dual writes against the legacy and relational stores.

use crate::error::MigrationResult;
use crate::kind::MigrationKind;
use lookup_core::{NoopCache, TableCache, DEFAULT_CHUNK_SIZE};
use lookup_model::legacy::{OWNER_DOC_TYPE, ROW_DOC_TYPE};
use lookup_model::{OwnerId, Row, RowId, RowOwner, Table, TableId};
use lookup_storage::{check_outcomes, Document, DocumentStore, SaveOutcome, SqliteStore};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every write one reconciled table needs, applied as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWrite {
    /// Owning domain.
    pub domain: String,
    /// The table all rows belong to.
    pub table_id: TableId,
    /// New definition of the table, saved with the rows.
    pub table: Option<Table>,
    /// Table deleted, with its rows and owners, before the new definition
    /// takes its tag.
    pub replaces: Option<TableId>,
    /// Rows to insert.
    pub create_rows: Vec<Row>,
    /// Rows kept in place whose stored columns may have changed.
    pub update_rows: Vec<Row>,
    /// Rows to delete together with their owners.
    pub delete_rows: Vec<RowId>,
    /// Owners to insert.
    pub create_owners: Vec<RowOwner>,
    /// Owners to delete.
    pub delete_owners: Vec<OwnerId>,
}

impl TableWrite {
    /// Creates an empty write for a table.
    pub fn new(domain: impl Into<String>, table_id: TableId) -> Self {
        Self {
            domain: domain.into(),
            table_id,
            table: None,
            replaces: None,
            create_rows: Vec::new(),
            update_rows: Vec::new(),
            delete_rows: Vec::new(),
            create_owners: Vec::new(),
            delete_owners: Vec::new(),
        }
    }

    /// Returns true if there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_none()
            && self.replaces.is_none()
            && self.create_rows.is_empty()
            && self.update_rows.is_empty()
            && self.delete_rows.is_empty()
            && self.create_owners.is_empty()
            && self.delete_owners.is_empty()
    }
}

/// Counts written by [`DualWriteAdapter::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Whether the table definition changed.
    pub table_saved: bool,
    /// Rows inserted.
    pub rows_created: usize,
    /// Rows whose stored columns changed.
    pub rows_updated: usize,
    /// Rows deleted.
    pub rows_deleted: usize,
    /// Owners inserted.
    pub owners_created: usize,
    /// Owners deleted, excluding those removed with their row.
    pub owners_deleted: usize,
}

/// Keeps the legacy and relational stores equivalent on every write.
///
/// Writes go to the legacy store first, as one bulk request. If any
/// document of that request fails, the documents that were written are put
/// back as they were, the relational store is left untouched and a
/// [`lookup_storage::StorageError::Transport`] is returned. Both stores then
/// hold the state from before the call, so the operation can be retried.
/// Relational writes are chunked, one transaction per chunk. The cache is
/// invalidated once per operation, after the relational store has committed.
///
/// # Example
///
/// ```rust
/// use lookup_migration::DualWriteAdapter;
/// use lookup_model::Table;
/// use lookup_storage::{DocumentStore, InMemoryDocumentStore, SqliteStore};
/// use std::sync::Arc;
///
/// let adapter = DualWriteAdapter::new(
///     Arc::new(InMemoryDocumentStore::new()),
///     Arc::new(SqliteStore::open_in_memory().unwrap()),
/// );
/// let table = Table::new("d", "states");
/// adapter.save_relational(&table).unwrap();
/// assert!(adapter.legacy().get(&table.id.to_legacy()).unwrap().is_some());
/// ```
#[derive(Clone)]
pub struct DualWriteAdapter {
    legacy: Arc<dyn DocumentStore>,
    relational: Arc<SqliteStore>,
    cache: Arc<dyn TableCache>,
    chunk_size: usize,
}

impl std::fmt::Debug for DualWriteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualWriteAdapter")
            .field("relational", &self.relational)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl DualWriteAdapter {
    /// Creates an adapter without a cache.
    pub fn new(legacy: Arc<dyn DocumentStore>, relational: Arc<SqliteStore>) -> Self {
        Self {
            legacy,
            relational,
            cache: Arc::new(NoopCache),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the cache invalidated after each write.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn TableCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the relational chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// The legacy store.
    #[must_use]
    pub fn legacy(&self) -> &dyn DocumentStore {
        self.legacy.as_ref()
    }

    /// The relational store.
    #[must_use]
    pub fn relational(&self) -> &SqliteStore {
        &self.relational
    }

    /// The relational chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn invalidate(&self, scopes: BTreeSet<(String, TableId)>) {
        for (domain, table_id) in scopes {
            self.cache.invalidate(&domain, table_id);
        }
    }

    pub(crate) fn invalidate_record<K: MigrationKind>(&self, record: &K) -> MigrationResult<()> {
        if let Some((domain, table_id)) = record.cache_scope(&self.relational)? {
            self.cache.invalidate(&domain, table_id);
        }
        Ok(())
    }

    /// Saves a legacy document and brings its relational record in line.
    ///
    /// Runs inside the caller's save: any failure is the save's failure.
    /// Only changed columns are written, so repeating the call writes
    /// nothing relationally.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be projected or either store
    /// rejects the write.
    pub fn sync_on_save<K: MigrationKind>(&self, doc: Document) -> MigrationResult<SaveOutcome> {
        let legacy = K::parse(&doc)?;
        let record = K::project(&legacy)?;
        self.legacy.save(doc)?;
        let outcome = self.relational.save(&record)?;
        if outcome.wrote() {
            debug!(kind = K::KIND, id = %record.record_id(), ?outcome, "synced legacy save");
            self.invalidate_record(&record)?;
        }
        Ok(outcome)
    }

    /// Saves a relational record and mirrors it to its legacy document.
    ///
    /// Attributes of an existing legacy document that the relational model
    /// does not know are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if either store rejects the write.
    pub fn save_relational<K: MigrationKind>(&self, record: &K) -> MigrationResult<SaveOutcome> {
        let outcome = self.relational.save(record)?;
        let doc = self.merged_document(record)?;
        self.legacy.save(doc)?;
        if outcome.wrote() {
            self.invalidate_record(record)?;
        }
        Ok(outcome)
    }

    fn merged_document<K: MigrationKind>(&self, record: &K) -> MigrationResult<Document> {
        let doc = record.to_document()?;
        Ok(match self.legacy.get(doc.id())? {
            Some(mut existing) => {
                existing.merge(doc);
                existing
            }
            None => doc,
        })
    }

    /// Deletes and saves legacy documents in one request, all or nothing.
    ///
    /// On a partial failure the documents that did change are restored from
    /// a snapshot taken before the request: overwritten and deleted ones get
    /// their old body back, new ones are deleted again.
    fn write_legacy(&self, save: Vec<Document>, delete: &[String]) -> MigrationResult<()> {
        let ids: Vec<String> = delete
            .iter()
            .cloned()
            .chain(save.iter().map(|d| d.id().to_string()))
            .collect();
        let mut before: HashMap<String, Document> = self
            .legacy
            .get_many(&ids)?
            .into_iter()
            .map(|d| (d.id().to_string(), d))
            .collect();

        let outcomes = self.legacy.bulk_write(save, delete)?;
        let Err(err) = check_outcomes(&outcomes) else {
            return Ok(());
        };

        let mut restore = Vec::new();
        let mut remove = Vec::new();
        for outcome in outcomes.iter().filter(|o| o.is_ok()) {
            match before.remove(&outcome.id) {
                Some(doc) => restore.push(doc),
                None => remove.push(outcome.id.clone()),
            }
        }
        let restored = restore.len() + remove.len();
        match self
            .legacy
            .bulk_write(restore, &remove)
            .and_then(|o| check_outcomes(&o))
        {
            Ok(()) => debug!(documents = restored, "rolled back partial legacy write"),
            Err(rollback) => warn!(
                error = %rollback,
                documents = restored,
                "could not roll back partial legacy write"
            ),
        }
        Err(err.into())
    }

    /// Applies the writes of one table to both stores.
    ///
    /// Legacy owner documents of deleted rows are deleted in the same
    /// request; relationally they go with their row. A replaced table is
    /// deleted in that request too.
    ///
    /// # Errors
    ///
    /// Returns [`lookup_storage::StorageError::Transport`] if any legacy
    /// document fails, leaving both stores as they were.
    pub fn apply(&self, write: &TableWrite) -> MigrationResult<WriteStats> {
        if write.is_empty() {
            return Ok(WriteStats::default());
        }

        let mut delete: Vec<String> = match write.replaces {
            Some(old) => self.table_documents(old)?,
            None => Vec::new(),
        };
        delete.extend(write.delete_owners.iter().map(OwnerId::to_legacy));
        for row_id in &write.delete_rows {
            let hex = row_id.to_legacy();
            for owner in self.legacy.view_owners_by_row(OWNER_DOC_TYPE, &hex)? {
                delete.push(owner.id().to_string());
            }
            delete.push(hex);
        }
        let mut save = Vec::with_capacity(
            1 + write.create_rows.len() + write.update_rows.len() + write.create_owners.len(),
        );
        if let Some(table) = &write.table {
            save.push(self.merged_document(table)?);
        }
        for row in &write.create_rows {
            save.push(row.to_document()?);
        }
        for row in &write.update_rows {
            save.push(self.merged_document(row)?);
        }
        for owner in &write.create_owners {
            save.push(owner.to_document()?);
        }
        self.write_legacy(save, &delete)?;

        let relational = &self.relational;
        if let Some(old) = write.replaces {
            relational.delete::<Table>(old)?;
            info!(domain = %write.domain, table_id = %old, "deleted replaced table");
            self.cache.invalidate(&write.domain, old);
        }
        let table_saved = match &write.table {
            Some(table) => relational.save(table)?.wrote(),
            None => false,
        };
        let owners_deleted = relational
            .apply_chunked::<RowOwner>(&[], &write.delete_owners, self.chunk_size)?
            .deleted;
        let rows = relational.apply_chunked(&write.create_rows, &write.delete_rows, self.chunk_size)?;
        let rows_updated = relational.save_chunked(&write.update_rows, self.chunk_size)?;
        let owners_created = relational
            .apply_chunked(&write.create_owners, &[], self.chunk_size)?
            .created;

        let stats = WriteStats {
            table_saved,
            rows_created: rows.created,
            rows_updated,
            rows_deleted: rows.deleted,
            owners_created,
            owners_deleted,
        };
        info!(
            domain = %write.domain,
            table_id = %write.table_id,
            created = stats.rows_created,
            updated = stats.rows_updated,
            deleted = stats.rows_deleted,
            "applied table write"
        );
        self.cache.invalidate(&write.domain, write.table_id);
        Ok(stats)
    }

    /// Legacy ids of a table document and everything under it, owners first.
    fn table_documents(&self, table_id: TableId) -> MigrationResult<Vec<String>> {
        let hex = table_id.to_legacy();
        let mut ids = Vec::new();
        for row in self.legacy.view_rows_by_table(ROW_DOC_TYPE, &hex)? {
            for owner in self.legacy.view_owners_by_row(OWNER_DOC_TYPE, row.id())? {
                ids.push(owner.id().to_string());
            }
            ids.push(row.id().to_string());
        }
        ids.push(hex);
        Ok(ids)
    }

    /// Deletes a table with all its rows and owners from both stores.
    ///
    /// Returns the number of legacy documents deleted. Deleting a table that
    /// does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`lookup_storage::StorageError::Transport`] if any legacy
    /// document fails, leaving both stores as they were.
    pub fn delete_table(&self, domain: &str, table_id: TableId) -> MigrationResult<usize> {
        let delete = self.table_documents(table_id)?;
        self.write_legacy(Vec::new(), &delete)?;

        self.relational.delete::<Table>(table_id)?;
        info!(domain, table_id = %table_id, documents = delete.len(), "deleted table");
        self.cache.invalidate(domain, table_id);
        Ok(delete.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_core::MemoizedTableCache;
    use lookup_model::{FieldDef, OwnerType};
    use lookup_storage::{InMemoryDocumentStore, StorageError};
    use serde_json::json;

    struct Fixture {
        legacy: Arc<InMemoryDocumentStore>,
        cache: Arc<MemoizedTableCache>,
        adapter: DualWriteAdapter,
        table: Table,
    }

    fn fixture() -> Fixture {
        let legacy = Arc::new(InMemoryDocumentStore::new());
        let cache = Arc::new(MemoizedTableCache::new());
        let adapter = DualWriteAdapter::new(
            legacy.clone(),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
        )
        .with_cache(cache.clone())
        .with_chunk_size(2);
        let table = Table::new("d", "states").with_field(FieldDef::new("name"));
        adapter.save_relational(&table).unwrap();
        Fixture {
            legacy,
            cache,
            adapter,
            table,
        }
    }

    fn row(f: &Fixture, name: &str) -> Row {
        Row::new("d", f.table.id).with_value("name", name)
    }

    #[test]
    fn sync_on_save_is_idempotent() {
        let f = fixture();
        let doc = Document::from_value(json!({
            "_id": "cddc3a035aab444a8ead069c942d7472",
            "doc_type": "LookupTableRow",
            "domain": "d",
            "table_id": f.table.id.to_legacy(),
            "fields": {"name": "Ohio"},
            "sort_key": 1,
        }))
        .unwrap();
        assert_eq!(
            f.adapter.sync_on_save::<Row>(doc.clone()).unwrap(),
            SaveOutcome::Created
        );
        assert_eq!(f.adapter.sync_on_save::<Row>(doc).unwrap(), SaveOutcome::Unchanged);
        assert_eq!(f.cache.invalidation_count("d", f.table.id), 2);
        assert_eq!(f.adapter.relational().count_rows(f.table.id).unwrap(), 1);
    }

    #[test]
    fn sync_on_save_writes_changed_columns_only() {
        let f = fixture();
        let r = row(&f, "Ohio");
        f.adapter.save_relational(&r).unwrap();
        let mut doc = r.to_document().unwrap();
        doc.merge(Document::from_value(json!({"_id": r.id.to_legacy(), "doc_type": ROW_DOC_TYPE, "sort_key": 9})).unwrap());
        assert_eq!(
            f.adapter.sync_on_save::<Row>(doc).unwrap(),
            SaveOutcome::Updated(vec!["sort_key"])
        );
    }

    #[test]
    fn rejected_sync_surfaces_as_save_failure() {
        let f = fixture();
        let doc = Document::from_value(json!({
            "_id": "not-an-id",
            "doc_type": "LookupTableRow",
            "domain": "d",
        }))
        .unwrap();
        assert!(f.adapter.sync_on_save::<Row>(doc).is_err());
        assert!(f.legacy.get("not-an-id").unwrap().is_none());
    }

    #[test]
    fn save_relational_keeps_unknown_legacy_attributes() {
        let f = fixture();
        let hex = f.table.id.to_legacy();
        let mut doc = f.legacy.get(&hex).unwrap().unwrap();
        doc.merge(Document::from_value(json!({"_id": hex, "doc_type": "LookupTable", "copy_from": "x"})).unwrap());
        f.legacy.save(doc).unwrap();

        let renamed = Table {
            tag: "provinces".into(),
            ..f.table.clone()
        };
        f.adapter.save_relational(&renamed).unwrap();
        let doc = f.legacy.get(&hex).unwrap().unwrap();
        assert_eq!(doc.get_str("tag"), Some("provinces"));
        assert_eq!(doc.get_str("copy_from"), Some("x"));
    }

    #[test]
    fn apply_writes_both_stores_and_invalidates_once() {
        let f = fixture();
        let ohio = row(&f, "Ohio");
        let mut first = TableWrite::new("d", f.table.id);
        first.create_rows = vec![ohio.clone(), row(&f, "Texas"), row(&f, "Utah")];
        first.create_owners = vec![RowOwner::new("d", ohio.id, OwnerType::User, "u1")];
        let stats = f.adapter.apply(&first).unwrap();
        assert_eq!(stats.rows_created, 3);
        assert_eq!(stats.owners_created, 1);
        assert_eq!(f.cache.invalidation_count("d", f.table.id), 2);

        let mut second = TableWrite::new("d", f.table.id);
        second.delete_rows = vec![ohio.id];
        let stats = f.adapter.apply(&second).unwrap();
        assert_eq!(stats.rows_deleted, 1);
        assert_eq!(f.adapter.relational().count_rows(f.table.id).unwrap(), 2);
        assert_eq!(f.legacy.count_doc_type(OWNER_DOC_TYPE).unwrap(), 0);
        assert_eq!(f.legacy.count_doc_type(ROW_DOC_TYPE).unwrap(), 2);
        assert_eq!(f.cache.invalidation_count("d", f.table.id), 3);
    }

    #[test]
    fn empty_write_touches_nothing() {
        let f = fixture();
        let stats = f.adapter.apply(&TableWrite::new("d", f.table.id)).unwrap();
        assert_eq!(stats, WriteStats::default());
        assert_eq!(f.cache.invalidation_count("d", f.table.id), 1);
    }

    #[test]
    fn legacy_failure_leaves_both_stores_untouched() {
        let f = fixture();
        let texas = row(&f, "Texas");
        f.legacy.reject_writes(texas.id.to_legacy());
        let mut write = TableWrite::new("d", f.table.id);
        write.create_rows = vec![row(&f, "Ohio"), texas.clone()];
        let err = f.adapter.apply(&write).unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(
            err,
            crate::MigrationError::Storage(StorageError::Transport { ref failed, .. })
                if failed == &vec![texas.id.to_legacy()]
        ));
        assert_eq!(f.adapter.relational().count_rows(f.table.id).unwrap(), 0);
        assert_eq!(f.legacy.count_doc_type(ROW_DOC_TYPE).unwrap(), 0);
    }

    #[test]
    fn failed_delete_restores_written_documents() {
        let f = fixture();
        let (ohio, texas) = (row(&f, "Ohio"), row(&f, "Texas"));
        let mut write = TableWrite::new("d", f.table.id);
        write.create_rows = vec![ohio.clone(), texas.clone()];
        write.create_owners = vec![RowOwner::new("d", ohio.id, OwnerType::User, "u")];
        f.adapter.apply(&write).unwrap();
        let before = f.legacy.documents();

        f.legacy.reject_writes(texas.id.to_legacy());
        let mut write = TableWrite::new("d", f.table.id);
        write.delete_rows = vec![ohio.id, texas.id];
        write.create_rows = vec![row(&f, "Utah")];
        assert!(f.adapter.apply(&write).unwrap_err().is_transport());

        assert_eq!(f.legacy.documents(), before);
        assert_eq!(f.adapter.relational().count_rows(f.table.id).unwrap(), 2);
        assert_eq!(f.adapter.relational().count::<RowOwner>().unwrap(), 1);
    }

    #[test]
    fn delete_table_cascades_in_both_stores() {
        let f = fixture();
        let ohio = row(&f, "Ohio");
        let mut write = TableWrite::new("d", f.table.id);
        write.create_rows = vec![ohio.clone()];
        write.create_owners = vec![RowOwner::new("d", ohio.id, OwnerType::Group, "g")];
        f.adapter.apply(&write).unwrap();

        assert_eq!(f.adapter.delete_table("d", f.table.id).unwrap(), 3);
        assert!(f.legacy.is_empty());
        assert_eq!(f.adapter.relational().count::<Row>().unwrap(), 0);
        assert_eq!(f.adapter.relational().count::<RowOwner>().unwrap(), 0);
        assert!(f.adapter.relational().get::<Table>(f.table.id).unwrap().is_none());
    }
}
