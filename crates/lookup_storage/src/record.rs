//! Mapping between model entities and relational rows.

use crate::error::StorageResult;
use lookup_model::wire::FieldMap;
use lookup_model::{FieldDef, ModelError, OwnerId, Row, RowId, RowOwner, Table, TableId};
use rusqlite::types::{Type, Value as SqlValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

/// An entity persisted as one relational row.
///
/// The first selected column is always `id`, followed by [`Record::COLUMNS`]
/// in order.
pub trait Record: Clone + Send + Sync + 'static {
    /// Human-readable kind used in errors and logs.
    const KIND: &'static str;
    /// SQL table name.
    const SQL_TABLE: &'static str;
    /// Data columns, excluding `id`.
    const COLUMNS: &'static [&'static str];

    /// Identifier type.
    type Id: Copy + Eq + Hash + Ord + Debug + Display + FromStr<Err = ModelError> + Send + Sync;

    /// Returns the record id.
    fn record_id(&self) -> Self::Id;

    /// Returns the column values in [`Record::COLUMNS`] order.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON column cannot be serialized.
    fn values(&self) -> StorageResult<Vec<SqlValue>>;

    /// Builds a record from a selected row.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if a column holds an unexpected value.
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

/// Returns the names of columns whose values differ between two records.
///
/// # Errors
///
/// Returns an error if either record cannot be converted to column values.
pub fn changed_columns<R: Record>(old: &R, new: &R) -> StorageResult<Vec<&'static str>> {
    let old = old.values()?;
    let new = new.values()?;
    Ok(R::COLUMNS
        .iter()
        .zip(old.iter().zip(new.iter()))
        .filter(|(_, (a, b))| a != b)
        .map(|(name, _)| *name)
        .collect())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_parsed<T: FromStr<Err = ModelError>>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn get_json<T: for<'de> Deserialize<'de>>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn json_column<T: Serialize>(value: &T) -> StorageResult<SqlValue> {
    Ok(SqlValue::Text(serde_json::to_string(value)?))
}

#[derive(Serialize, Deserialize)]
struct WireFields(#[serde(with = "lookup_model::wire::fields")] FieldMap);

impl Record for Table {
    const KIND: &'static str = "table";
    const SQL_TABLE: &'static str = "lookup_table";
    const COLUMNS: &'static [&'static str] = &[
        "domain",
        "tag",
        "is_global",
        "fields",
        "item_attributes",
        "description",
    ];

    type Id = TableId;

    fn record_id(&self) -> TableId {
        self.id
    }

    fn values(&self) -> StorageResult<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.domain.clone()),
            SqlValue::Text(self.tag.clone()),
            SqlValue::Integer(i64::from(self.is_global)),
            json_column(&self.fields)?,
            json_column(&self.item_attributes)?,
            SqlValue::Text(self.description.clone()),
        ])
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Table {
            id: get_parsed(row, 0)?,
            domain: row.get(1)?,
            tag: row.get(2)?,
            is_global: row.get(3)?,
            fields: get_json::<Vec<FieldDef>>(row, 4)?,
            item_attributes: get_json(row, 5)?,
            description: row.get(6)?,
        })
    }
}

impl Record for Row {
    const KIND: &'static str = "row";
    const SQL_TABLE: &'static str = "lookup_table_row";
    const COLUMNS: &'static [&'static str] =
        &["domain", "table_id", "fields", "item_attributes", "sort_key"];

    type Id = RowId;

    fn record_id(&self) -> RowId {
        self.id
    }

    fn values(&self) -> StorageResult<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.domain.clone()),
            SqlValue::Text(self.table_id.to_legacy()),
            json_column(&WireFields(self.fields.clone()))?,
            json_column(&self.item_attributes)?,
            SqlValue::Integer(self.sort_key),
        ])
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Row {
            id: get_parsed(row, 0)?,
            domain: row.get(1)?,
            table_id: get_parsed(row, 2)?,
            fields: get_json::<WireFields>(row, 3)?.0,
            item_attributes: get_json::<BTreeMap<String, String>>(row, 4)?,
            sort_key: row.get(5)?,
        })
    }
}

impl Record for RowOwner {
    const KIND: &'static str = "owner";
    const SQL_TABLE: &'static str = "lookup_table_row_owner";
    const COLUMNS: &'static [&'static str] = &["domain", "row_id", "owner_type", "owner_id"];

    type Id = OwnerId;

    fn record_id(&self) -> OwnerId {
        self.id
    }

    fn values(&self) -> StorageResult<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.domain.clone()),
            SqlValue::Text(self.row_id.to_legacy()),
            SqlValue::Text(self.owner_type.as_str().to_string()),
            SqlValue::Text(self.owner_id.clone()),
        ])
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(RowOwner {
            id: get_parsed(row, 0)?,
            domain: row.get(1)?,
            row_id: get_parsed(row, 2)?,
            owner_type: get_parsed(row, 3)?,
            owner_id: row.get(4)?,
        })
    }
}
