//! Lookup table rows.

use crate::id::{RowId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One value of a field, qualified by property values.
///
/// A field without declared properties carries exactly one `FieldValue`
/// with empty `properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldValue {
    /// The value.
    #[serde(rename = "field_value")]
    pub value: String,
    /// Property name to property value.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl FieldValue {
    /// Creates a value without properties.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property value.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// The content of a row that determines equality across snapshots.
///
/// Excludes the id, sort key and owners so that an unchanged row in a new
/// snapshot matches its persisted counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowContent {
    /// Field values.
    pub fields: BTreeMap<String, Vec<FieldValue>>,
    /// Item attributes.
    pub item_attributes: BTreeMap<String, String>,
}

/// A record within a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Row id.
    pub id: RowId,
    /// Owning table.
    pub table_id: TableId,
    /// Owning domain.
    pub domain: String,
    /// Field name to ordered values.
    #[serde(default, with = "crate::wire::fields")]
    pub fields: BTreeMap<String, Vec<FieldValue>>,
    /// Item attribute name to value.
    #[serde(default)]
    pub item_attributes: BTreeMap<String, String>,
    /// Stable export and sync ordering.
    #[serde(default)]
    pub sort_key: i64,
}

impl Row {
    /// Creates an empty row with a fresh id.
    pub fn new(domain: impl Into<String>, table_id: TableId) -> Self {
        Self {
            id: RowId::new(),
            table_id,
            domain: domain.into(),
            fields: BTreeMap::new(),
            item_attributes: BTreeMap::new(),
            sort_key: 0,
        }
    }

    /// Sets the id.
    #[must_use]
    pub const fn with_id(mut self, id: RowId) -> Self {
        self.id = id;
        self
    }

    /// Sets a field to a single value without properties.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), vec![FieldValue::new(value)]);
        self
    }

    /// Sets a field to a list of values.
    #[must_use]
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<FieldValue>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    /// Sets an item attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.item_attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the sort key.
    #[must_use]
    pub const fn with_sort_key(mut self, sort_key: i64) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// Returns the values of a field, or an empty slice if absent.
    #[must_use]
    pub fn field_list(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the first value of a field.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.field_list(name).first().map(|v| v.value.as_str())
    }

    /// Returns the content used to match this row against another snapshot.
    #[must_use]
    pub fn content_key(&self) -> RowContent {
        RowContent {
            fields: self.fields.clone(),
            item_attributes: self.item_attributes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_id() -> TableId {
        TableId::parse("0fb6c422115145c0a651bb9a34ca09c4").unwrap()
    }

    #[test]
    fn content_key_ignores_identity_and_order() {
        let a = Row::new("d", table_id()).with_value("name", "Ohio").with_sort_key(0);
        let b = Row::new("d", table_id()).with_value("name", "Ohio").with_sort_key(7);
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_key(), b.content_key());
    }

    #[test]
    fn content_key_sees_properties() {
        let a = Row::new("d", table_id())
            .with_values("name", vec![FieldValue::new("Ohio").with_property("lang", "en")]);
        let b = Row::new("d", table_id())
            .with_values("name", vec![FieldValue::new("Ohio").with_property("lang", "fr")]);
        assert_ne!(a.content_key(), b.content_key());
    }

    #[test]
    fn field_list_missing_is_empty() {
        let row = Row::new("d", table_id());
        assert!(row.field_list("nope").is_empty());
        assert_eq!(row.scalar("nope"), None);
    }

    #[test]
    fn serializes_fields_in_wire_shape() {
        let row = Row::new("d", table_id()).with_value("name", "Ohio");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json["fields"],
            serde_json::json!({"name": {"field_list": [{"field_value": "Ohio", "properties": {}}]}})
        );
        let back: Row = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }
}
