//! Legacy document shapes and the upgrade step applied at read time.
//!
//! Legacy documents accumulated several shapes over time:
//!
//! - table `fields` is either a list of `{field_name, properties, is_indexed}`
//!   objects or a list of bare field names
//! - row `fields` values are either `{field_list: [...]}` or a bare scalar
//! - item attribute values may be numbers
//! - collections and scalars may be missing entirely
//!
//! All of that is normalized here, once, so nothing downstream branches on
//! shape. Writing always produces the modern shape.

use crate::error::{ModelError, ModelResult};
use crate::id::{OwnerId, RowId, TableId};
use crate::owner::{OwnerType, RowOwner};
use crate::row::{FieldValue, Row};
use crate::table::{FieldDef, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Document type of a legacy table document.
pub const TABLE_DOC_TYPE: &str = "LookupTable";
/// Document type of a legacy row document.
pub const ROW_DOC_TYPE: &str = "LookupTableRow";
/// Document type of a legacy owner document.
pub const OWNER_DOC_TYPE: &str = "LookupTableRowOwner";

/// Renders a legacy scalar the way the relational store keeps it.
///
/// Strings pass through, numbers use their shortest decimal rendering,
/// booleans become `true`/`false` and null becomes the empty string.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// A table field definition in either legacy shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyFieldDef {
    /// `{field_name, properties, is_indexed}`.
    Modern {
        /// Field name.
        field_name: String,
        /// Property names.
        #[serde(default)]
        properties: Vec<String>,
        /// Index flag.
        #[serde(default)]
        is_indexed: bool,
    },
    /// A bare field name.
    Name(String),
}

impl LegacyFieldDef {
    /// Upgrades to a [`FieldDef`].
    #[must_use]
    pub fn upgrade(self) -> FieldDef {
        match self {
            Self::Modern {
                field_name,
                properties,
                is_indexed,
            } => FieldDef {
                name: field_name,
                properties,
                is_indexed,
            },
            Self::Name(name) => FieldDef::new(name),
        }
    }
}

impl From<&FieldDef> for LegacyFieldDef {
    fn from(field: &FieldDef) -> Self {
        Self::Modern {
            field_name: field.name.clone(),
            properties: field.properties.clone(),
            is_indexed: field.is_indexed,
        }
    }
}

/// One value inside a legacy `field_list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFieldValue {
    /// The value; may be a number in old documents.
    pub field_value: Value,
    /// Property values.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// A row field in either legacy shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyRowField {
    /// `{field_list: [...]}`.
    Modern {
        /// Values in order.
        field_list: Vec<LegacyFieldValue>,
    },
    /// A bare scalar value.
    Scalar(Value),
}

impl LegacyRowField {
    /// Upgrades to a list of [`FieldValue`]s.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedDocument`] for nested values that are
    /// neither a field list nor a scalar.
    pub fn upgrade(self, doc_id: &str, name: &str) -> ModelResult<Vec<FieldValue>> {
        let bad = || ModelError::malformed(doc_id, format!("field '{name}' has an invalid value"));
        match self {
            Self::Modern { field_list } => field_list
                .into_iter()
                .map(|item| {
                    let value = scalar_to_string(&item.field_value).ok_or_else(bad)?;
                    let properties = item
                        .properties
                        .into_iter()
                        .map(|(k, v)| scalar_to_string(&v).map(|v| (k, v)).ok_or_else(bad))
                        .collect::<ModelResult<_>>()?;
                    Ok(FieldValue { value, properties })
                })
                .collect(),
            Self::Scalar(value) => {
                let value = scalar_to_string(&value).ok_or_else(bad)?;
                Ok(vec![FieldValue::new(value)])
            }
        }
    }
}

impl From<&[FieldValue]> for LegacyRowField {
    fn from(values: &[FieldValue]) -> Self {
        Self::Modern {
            field_list: values
                .iter()
                .map(|v| LegacyFieldValue {
                    field_value: Value::String(v.value.clone()),
                    properties: v
                        .properties
                        .iter()
                        .map(|(k, p)| (k.clone(), Value::String(p.clone())))
                        .collect(),
                })
                .collect(),
        }
    }
}

fn require<T>(value: Option<T>, doc_id: &str, attr: &str) -> ModelResult<T> {
    value.ok_or_else(|| ModelError::malformed(doc_id, format!("missing '{attr}'")))
}

fn parse_doc<T: for<'de> Deserialize<'de>>(value: Value, expected: &str) -> ModelResult<T> {
    let doc_id = value
        .get("_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match value.get("doc_type").and_then(Value::as_str) {
        Some(doc_type) if doc_type == expected => {}
        other => {
            return Err(ModelError::malformed(
                doc_id,
                format!("expected doc_type {expected}, found {other:?}"),
            ))
        }
    }
    serde_json::from_value(value).map_err(|e| ModelError::malformed(doc_id, e.to_string()))
}

fn to_doc<T: Serialize>(doc: &T) -> Value {
    // Derived Serialize over strings, maps and bools cannot fail.
    serde_json::to_value(doc).unwrap_or(Value::Null)
}

/// A legacy table document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTableDoc {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document type.
    pub doc_type: String,
    /// Owning domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Global flag; missing means false.
    #[serde(default)]
    pub is_global: Option<bool>,
    /// Field definitions.
    #[serde(default)]
    pub fields: Option<Vec<LegacyFieldDef>>,
    /// Item attribute names; missing means empty.
    #[serde(default)]
    pub item_attributes: Option<Vec<String>>,
    /// Description; missing means empty.
    #[serde(default)]
    pub description: Option<String>,
}

impl LegacyTableDoc {
    /// Parses a raw document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedDocument`] if the document has the wrong
    /// type or shape.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        parse_doc(value, TABLE_DOC_TYPE)
    }

    /// Builds the modern document for a table.
    #[must_use]
    pub fn from_table(table: &Table) -> Self {
        Self {
            id: table.id.to_legacy(),
            doc_type: TABLE_DOC_TYPE.to_string(),
            domain: Some(table.domain.clone()),
            tag: Some(table.tag.clone()),
            is_global: Some(table.is_global),
            fields: Some(table.fields.iter().map(LegacyFieldDef::from).collect()),
            item_attributes: Some(table.item_attributes.clone()),
            description: Some(table.description.clone()),
        }
    }

    /// Serializes to a raw document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        to_doc(self)
    }

    /// Normalized field definitions.
    #[must_use]
    pub fn field_defs(&self) -> Vec<FieldDef> {
        self.fields
            .iter()
            .flatten()
            .cloned()
            .map(LegacyFieldDef::upgrade)
            .collect()
    }

    /// Upgrades to a [`Table`].
    ///
    /// # Errors
    ///
    /// Returns an error if the id, domain or tag is missing or invalid.
    pub fn upgrade(&self) -> ModelResult<Table> {
        Ok(Table {
            id: TableId::parse(&self.id)?,
            domain: require(self.domain.clone(), &self.id, "domain")?,
            tag: require(self.tag.clone(), &self.id, "tag")?,
            is_global: self.is_global.unwrap_or(false),
            fields: self.field_defs(),
            item_attributes: self.item_attributes.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
        })
    }
}

/// A legacy row document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRowDoc {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document type.
    pub doc_type: String,
    /// Owning domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Owning table document id.
    #[serde(default)]
    pub table_id: Option<String>,
    /// Fields in either shape.
    #[serde(default)]
    pub fields: Option<BTreeMap<String, LegacyRowField>>,
    /// Item attributes; values may be numbers.
    #[serde(default)]
    pub item_attributes: Option<BTreeMap<String, Value>>,
    /// Sort key; missing or null means 0.
    #[serde(default)]
    pub sort_key: Option<i64>,
}

impl LegacyRowDoc {
    /// Parses a raw document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedDocument`] if the document has the wrong
    /// type or shape.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        parse_doc(value, ROW_DOC_TYPE)
    }

    /// Builds the modern document for a row.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.id.to_legacy(),
            doc_type: ROW_DOC_TYPE.to_string(),
            domain: Some(row.domain.clone()),
            table_id: Some(row.table_id.to_legacy()),
            fields: Some(
                row.fields
                    .iter()
                    .map(|(name, values)| (name.clone(), LegacyRowField::from(values.as_slice())))
                    .collect(),
            ),
            item_attributes: Some(
                row.item_attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            sort_key: Some(row.sort_key),
        }
    }

    /// Serializes to a raw document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        to_doc(self)
    }

    /// The owning table id, parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table id is missing or invalid.
    pub fn table_id(&self) -> ModelResult<TableId> {
        TableId::parse(&require(self.table_id.clone(), &self.id, "table_id")?)
    }

    /// Upgrades to a [`Row`].
    ///
    /// # Errors
    ///
    /// Returns an error if a required attribute is missing or a value has an
    /// unusable shape.
    pub fn upgrade(&self) -> ModelResult<Row> {
        let fields = self
            .fields
            .iter()
            .flatten()
            .map(|(name, field)| Ok((name.clone(), field.clone().upgrade(&self.id, name)?)))
            .collect::<ModelResult<_>>()?;
        let item_attributes = self
            .item_attributes
            .iter()
            .flatten()
            .map(|(name, value)| {
                scalar_to_string(value)
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| {
                        ModelError::malformed(&self.id, format!("item attribute '{name}' is not a scalar"))
                    })
            })
            .collect::<ModelResult<_>>()?;
        Ok(Row {
            id: RowId::parse(&self.id)?,
            table_id: self.table_id()?,
            domain: require(self.domain.clone(), &self.id, "domain")?,
            fields,
            item_attributes,
            sort_key: self.sort_key.unwrap_or(0),
        })
    }
}

/// A legacy row owner document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyOwnerDoc {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document type.
    pub doc_type: String,
    /// Owning domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Row document id.
    #[serde(default)]
    pub row_id: Option<String>,
    /// `user`, `group` or `location`.
    #[serde(default)]
    pub owner_type: Option<String>,
    /// Principal id.
    #[serde(default)]
    pub owner_id: Option<String>,
}

impl LegacyOwnerDoc {
    /// Parses a raw document.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedDocument`] if the document has the wrong
    /// type or shape.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        parse_doc(value, OWNER_DOC_TYPE)
    }

    /// Builds the document for an owner.
    #[must_use]
    pub fn from_owner(owner: &RowOwner) -> Self {
        Self {
            id: owner.id.to_legacy(),
            doc_type: OWNER_DOC_TYPE.to_string(),
            domain: Some(owner.domain.clone()),
            row_id: Some(owner.row_id.to_legacy()),
            owner_type: Some(owner.owner_type.as_str().to_string()),
            owner_id: Some(owner.owner_id.clone()),
        }
    }

    /// Serializes to a raw document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        to_doc(self)
    }

    /// The row id, parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the row id is missing or invalid.
    pub fn row_id(&self) -> ModelResult<RowId> {
        RowId::parse(&require(self.row_id.clone(), &self.id, "row_id")?)
    }

    /// Upgrades to a [`RowOwner`].
    ///
    /// # Errors
    ///
    /// Returns an error if a required attribute is missing or invalid.
    pub fn upgrade(&self) -> ModelResult<RowOwner> {
        Ok(RowOwner {
            id: OwnerId::parse(&self.id)?,
            domain: require(self.domain.clone(), &self.id, "domain")?,
            row_id: self.row_id()?,
            owner_type: require(self.owner_type.as_deref(), &self.id, "owner_type")?.parse()?,
            owner_id: require(self.owner_id.clone(), &self.id, "owner_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: &str = "0fb6c422115145c0a651bb9a34ca09c4";
    const ROW: &str = "cddc3a035aab444a8ead069c942d7472";

    #[test]
    fn upgrades_old_style_table_fields() {
        let doc = LegacyTableDoc::from_value(json!({
            "_id": TABLE,
            "doc_type": TABLE_DOC_TYPE,
            "domain": "some-domain",
            "tag": "price",
            "fields": ["amount", {"field_name": "qty", "properties": ["loc"]}],
        }))
        .unwrap();
        let table = doc.upgrade().unwrap();
        assert_eq!(table.fields[0], FieldDef::new("amount"));
        assert_eq!(table.fields[1], FieldDef::new("qty").with_properties(["loc"]));
        assert!(!table.is_global);
        assert!(table.item_attributes.is_empty());
        assert_eq!(table.description, "");
    }

    #[test]
    fn upgrades_old_style_row_fields_and_numbers() {
        let doc = LegacyRowDoc::from_value(json!({
            "_id": ROW,
            "doc_type": ROW_DOC_TYPE,
            "domain": "some-domain",
            "table_id": TABLE,
            "fields": {"amount": 1, "name": {"field_list": [{"field_value": "Andy"}]}},
            "item_attributes": {"height": 3.2},
            "sort_key": null,
        }))
        .unwrap();
        let row = doc.upgrade().unwrap();
        assert_eq!(row.field_list("amount"), &[FieldValue::new("1")]);
        assert_eq!(row.field_list("name"), &[FieldValue::new("Andy")]);
        assert_eq!(row.item_attributes["height"], "3.2");
        assert_eq!(row.sort_key, 0);
    }

    #[test]
    fn rejects_wrong_doc_type() {
        let err = LegacyTableDoc::from_value(json!({"_id": TABLE, "doc_type": ROW_DOC_TYPE}))
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedDocument { ref doc_id, .. } if doc_id == TABLE));
    }

    #[test]
    fn missing_domain_is_malformed() {
        let doc = LegacyTableDoc::from_value(json!({
            "_id": TABLE, "doc_type": TABLE_DOC_TYPE, "tag": "t"
        }))
        .unwrap();
        assert!(doc.upgrade().is_err());
    }

    #[test]
    fn nested_object_scalar_is_malformed() {
        let doc = LegacyRowDoc::from_value(json!({
            "_id": ROW, "doc_type": ROW_DOC_TYPE, "domain": "d", "table_id": TABLE,
            "fields": {"amount": {"unexpected": 1}},
        }))
        .unwrap();
        assert!(doc.upgrade().is_err());
    }

    #[test]
    fn writes_modern_shape() {
        let table = Table::new("d", "t").with_field(FieldDef::new("amount"));
        let doc = LegacyTableDoc::from_table(&table).to_value();
        assert_eq!(doc["fields"][0]["field_name"], "amount");
        assert_eq!(doc["_id"], table.id.to_legacy());

        let row = Row::new("d", table.id).with_value("amount", "1");
        let doc = LegacyRowDoc::from_row(&row).to_value();
        assert_eq!(doc["fields"]["amount"]["field_list"][0]["field_value"], "1");
        assert_eq!(doc["table_id"], table.id.to_legacy());
        let back = LegacyRowDoc::from_value(doc).unwrap().upgrade().unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn owner_upgrade() {
        let owner = RowOwner::new("d", RowId::new(), OwnerType::Group, "g1");
        let doc = LegacyOwnerDoc::from_owner(&owner).to_value();
        assert_eq!(doc["owner_type"], "group");
        let back = LegacyOwnerDoc::from_value(doc).unwrap().upgrade().unwrap();
        assert_eq!(back, owner);
    }
}
