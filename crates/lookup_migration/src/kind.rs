//! Per-kind projection and equivalence rules.
//!
//! Equivalence is not plain equality. A missing legacy collection equals an
//! empty relational one, and a missing legacy scalar equals the relational
//! default for that column. Diff lines still show the legacy value as
//! stored, so `null` appears when an attribute was missing.

use lookup_model::legacy::{
    scalar_to_string, LegacyOwnerDoc, LegacyRowDoc, LegacyTableDoc, OWNER_DOC_TYPE, ROW_DOC_TYPE,
    TABLE_DOC_TYPE,
};
use lookup_model::wire::{fields_to_value, FieldMap};
use lookup_model::{ModelResult, Row, RowOwner, Table, TableId};
use lookup_storage::{Document, DocumentStore, Record, SqliteStore, StorageResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// An entity kind kept in both stores.
///
/// # Implementors
///
/// - [`Table`] - natural key `(domain, tag)`
/// - [`Row`] - no natural key beyond its id; needs its table
/// - [`RowOwner`] - natural key `(row_id, owner_type, owner_id)`; needs its row
pub trait MigrationKind: Record {
    /// Legacy document type.
    const DOC_TYPE: &'static str;

    /// Parsed legacy document.
    type Legacy: Clone + Send + Sync;

    /// Parses a raw legacy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has the wrong type or shape.
    fn parse(doc: &Document) -> ModelResult<Self::Legacy>;

    /// Id of a parsed legacy document.
    fn legacy_id(legacy: &Self::Legacy) -> &str;

    /// Maps a legacy document to its relational record.
    ///
    /// # Errors
    ///
    /// Returns an error if a required attribute is missing or invalid.
    fn project(legacy: &Self::Legacy) -> ModelResult<Self>;

    /// Renders the record as a modern legacy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the rendering is not a valid document.
    fn to_document(&self) -> StorageResult<Document>;

    /// Lists the differences between a legacy document and a record, in
    /// column order. Empty means equivalent.
    fn diff(legacy: &Self::Legacy, relational: &Self) -> Vec<String>;

    /// Key that must be unique across records, rendered for logs.
    fn natural_key(&self) -> Option<String> {
        None
    }

    /// Relational records with another id that hold this record's natural
    /// key, and so block its insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn twins(&self, _store: &SqliteStore) -> StorageResult<Vec<Self>> {
        Ok(Vec::new())
    }

    /// Whether the record's parent exists relationally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn has_parent(&self, _store: &SqliteStore) -> StorageResult<bool> {
        Ok(true)
    }

    /// Number of legacy documents that depend on this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn dependents(_legacy: &Self::Legacy, _docs: &dyn DocumentStore) -> StorageResult<usize> {
        Ok(0)
    }

    /// Domain and table whose cached contents change with this record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn cache_scope(&self, store: &SqliteStore) -> StorageResult<Option<(String, TableId)>>;
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn document(value: Value) -> StorageResult<Document> {
    Document::from_value(value)
}

#[derive(Default)]
struct Diff(Vec<String>);

impl Diff {
    fn check(&mut self, name: &str, legacy: Value, normalized: Value, relational: Value) {
        if normalized != relational {
            self.0
                .push(format!("{name}: legacy value {legacy} != relational value {relational}"));
        }
    }

    fn plain(&mut self, name: &str, legacy: Value, relational: Value) {
        self.check(name, legacy.clone(), legacy, relational);
    }
}

impl MigrationKind for Table {
    const DOC_TYPE: &'static str = TABLE_DOC_TYPE;
    type Legacy = LegacyTableDoc;

    fn parse(doc: &Document) -> ModelResult<LegacyTableDoc> {
        LegacyTableDoc::from_value(doc.to_value())
    }

    fn legacy_id(legacy: &LegacyTableDoc) -> &str {
        &legacy.id
    }

    fn project(legacy: &LegacyTableDoc) -> ModelResult<Table> {
        legacy.upgrade()
    }

    fn to_document(&self) -> StorageResult<Document> {
        document(LegacyTableDoc::from_table(self).to_value())
    }

    fn diff(legacy: &LegacyTableDoc, table: &Table) -> Vec<String> {
        let mut diff = Diff::default();
        diff.plain("domain", json(&legacy.domain), json(&table.domain));
        diff.plain("tag", json(&legacy.tag), json(&table.tag));
        diff.check(
            "is_global",
            json(&legacy.is_global),
            json(&legacy.is_global.unwrap_or(false)),
            json(&table.is_global),
        );
        diff.check(
            "fields",
            json(&legacy.fields),
            json(&legacy.field_defs()),
            json(&table.fields),
        );
        diff.check(
            "item_attributes",
            json(&legacy.item_attributes),
            json(&legacy.item_attributes.clone().unwrap_or_default()),
            json(&table.item_attributes),
        );
        diff.check(
            "description",
            json(&legacy.description),
            json(&legacy.description.clone().unwrap_or_default()),
            json(&table.description),
        );
        diff.0
    }

    fn natural_key(&self) -> Option<String> {
        Some(format!("({}, {})", self.domain, self.tag))
    }

    fn twins(&self, store: &SqliteStore) -> StorageResult<Vec<Table>> {
        Ok(store
            .find_table_by_tag(&self.domain, &self.tag)?
            .into_iter()
            .filter(|table| table.id != self.id)
            .collect())
    }

    fn dependents(legacy: &LegacyTableDoc, docs: &dyn DocumentStore) -> StorageResult<usize> {
        Ok(docs.view_rows_by_table(ROW_DOC_TYPE, &legacy.id)?.len())
    }

    fn cache_scope(&self, _store: &SqliteStore) -> StorageResult<Option<(String, TableId)>> {
        Ok(Some((self.domain.clone(), self.id)))
    }
}

fn normalized_fields(legacy: &LegacyRowDoc) -> Value {
    let upgraded: ModelResult<FieldMap> = legacy
        .fields
        .iter()
        .flatten()
        .map(|(name, field)| Ok((name.clone(), field.clone().upgrade(&legacy.id, name)?)))
        .collect();
    upgraded
        .and_then(|fields| fields_to_value(&fields))
        .unwrap_or_else(|_| json(&legacy.fields))
}

fn normalized_attributes(legacy: &LegacyRowDoc) -> Value {
    let attrs: Option<BTreeMap<&str, String>> = legacy
        .item_attributes
        .iter()
        .flatten()
        .map(|(name, value)| scalar_to_string(value).map(|v| (name.as_str(), v)))
        .collect();
    attrs.map_or_else(|| json(&legacy.item_attributes), |a| json(&a))
}

impl MigrationKind for Row {
    const DOC_TYPE: &'static str = ROW_DOC_TYPE;
    type Legacy = LegacyRowDoc;

    fn parse(doc: &Document) -> ModelResult<LegacyRowDoc> {
        LegacyRowDoc::from_value(doc.to_value())
    }

    fn legacy_id(legacy: &LegacyRowDoc) -> &str {
        &legacy.id
    }

    fn project(legacy: &LegacyRowDoc) -> ModelResult<Row> {
        legacy.upgrade()
    }

    fn to_document(&self) -> StorageResult<Document> {
        document(LegacyRowDoc::from_row(self).to_value())
    }

    fn diff(legacy: &LegacyRowDoc, row: &Row) -> Vec<String> {
        let mut diff = Diff::default();
        diff.plain("domain", json(&legacy.domain), json(&row.domain));
        diff.check(
            "table_id",
            json(&legacy.table_id),
            legacy
                .table_id()
                .map_or_else(|_| json(&legacy.table_id), |id| json(&id.to_legacy())),
            json(&row.table_id.to_legacy()),
        );
        diff.check(
            "fields",
            json(&legacy.fields),
            normalized_fields(legacy),
            fields_to_value(&row.fields).unwrap_or(Value::Null),
        );
        diff.check(
            "item_attributes",
            json(&legacy.item_attributes),
            normalized_attributes(legacy),
            json(&row.item_attributes),
        );
        diff.check(
            "sort_key",
            json(&legacy.sort_key),
            json(&legacy.sort_key.unwrap_or(0)),
            json(&row.sort_key),
        );
        diff.0
    }

    fn has_parent(&self, store: &SqliteStore) -> StorageResult<bool> {
        Ok(store.get::<Table>(self.table_id)?.is_some())
    }

    fn cache_scope(&self, _store: &SqliteStore) -> StorageResult<Option<(String, TableId)>> {
        Ok(Some((self.domain.clone(), self.table_id)))
    }
}

impl MigrationKind for RowOwner {
    const DOC_TYPE: &'static str = OWNER_DOC_TYPE;
    type Legacy = LegacyOwnerDoc;

    fn parse(doc: &Document) -> ModelResult<LegacyOwnerDoc> {
        LegacyOwnerDoc::from_value(doc.to_value())
    }

    fn legacy_id(legacy: &LegacyOwnerDoc) -> &str {
        &legacy.id
    }

    fn project(legacy: &LegacyOwnerDoc) -> ModelResult<RowOwner> {
        legacy.upgrade()
    }

    fn to_document(&self) -> StorageResult<Document> {
        document(LegacyOwnerDoc::from_owner(self).to_value())
    }

    fn diff(legacy: &LegacyOwnerDoc, owner: &RowOwner) -> Vec<String> {
        let mut diff = Diff::default();
        diff.plain("domain", json(&legacy.domain), json(&owner.domain));
        diff.check(
            "row_id",
            json(&legacy.row_id),
            legacy
                .row_id()
                .map_or_else(|_| json(&legacy.row_id), |id| json(&id.to_legacy())),
            json(&owner.row_id.to_legacy()),
        );
        diff.plain("owner_type", json(&legacy.owner_type), json(&owner.owner_type));
        diff.plain("owner_id", json(&legacy.owner_id), json(&owner.owner_id));
        diff.0
    }

    fn natural_key(&self) -> Option<String> {
        Some(format!(
            "({}, {}, {})",
            self.row_id, self.owner_type, self.owner_id
        ))
    }

    fn twins(&self, store: &SqliteStore) -> StorageResult<Vec<RowOwner>> {
        Ok(store
            .owners_for_row(self.row_id)?
            .into_iter()
            .filter(|owner| {
                owner.id != self.id
                    && owner.owner_type == self.owner_type
                    && owner.owner_id == self.owner_id
            })
            .collect())
    }

    fn has_parent(&self, store: &SqliteStore) -> StorageResult<bool> {
        Ok(store.get::<Row>(self.row_id)?.is_some())
    }

    fn cache_scope(&self, store: &SqliteStore) -> StorageResult<Option<(String, TableId)>> {
        Ok(store
            .get::<Row>(self.row_id)?
            .map(|row| (row.domain, row.table_id)))
    }
}
