//! Lookup table definitions.

use crate::error::{ModelError, ModelResult};
use crate::id::TableId;
use serde::{Deserialize, Serialize};

/// Maximum length of a table tag.
pub const MAX_TAG_LEN: usize = 31;

/// Returns true if `name` is usable as an element name on mobile clients.
///
/// The grammar is a conservative subset of XML names: non-empty, starting
/// with a letter or underscore, containing only letters, digits, `_`, `-`
/// and `.`, and not starting with the reserved prefix `xml` in any case.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return false;
    }
    !name
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xml"))
}

/// A declared field of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name (column header on import/export).
    pub name: String,
    /// Sub-attribute names, in column order (e.g. language variants).
    #[serde(default)]
    pub properties: Vec<String>,
    /// Whether mobile clients should index this field.
    #[serde(default)]
    pub is_indexed: bool,
}

impl FieldDef {
    /// Creates a field without properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            is_indexed: false,
        }
    }

    /// Sets the property names.
    #[must_use]
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the field as indexed.
    #[must_use]
    pub const fn indexed(mut self, is_indexed: bool) -> Self {
        self.is_indexed = is_indexed;
        self
    }

    /// Returns true if the field declares sub-properties.
    #[must_use]
    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}

/// A tenant-scoped lookup table definition.
///
/// # Invariants
///
/// - `tag` is unique within `domain`
/// - `fields` order is the canonical column order for import and export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table id.
    pub id: TableId,
    /// Owning domain.
    pub domain: String,
    /// Table tag, unique per domain.
    pub tag: String,
    /// Whether every mobile user sees all rows regardless of owners.
    #[serde(default)]
    pub is_global: bool,
    /// Declared fields in canonical order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Declared item attribute names in order.
    #[serde(default)]
    pub item_attributes: Vec<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl Table {
    /// Creates an empty table with a fresh id.
    pub fn new(domain: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: TableId::new(),
            domain: domain.into(),
            tag: tag.into(),
            is_global: false,
            fields: Vec::new(),
            item_attributes: Vec::new(),
            description: String::new(),
        }
    }

    /// Sets the id.
    #[must_use]
    pub const fn with_id(mut self, id: TableId) -> Self {
        self.id = id;
        self
    }

    /// Sets the global flag.
    #[must_use]
    pub const fn global(mut self, is_global: bool) -> Self {
        self.is_global = is_global;
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the item attribute names.
    #[must_use]
    pub fn with_item_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Looks up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the field names in canonical order.
    #[must_use]
    pub fn fields_without_attributes(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns true if both tables declare the same schema.
    ///
    /// Ids and domains are ignored.
    #[must_use]
    pub fn same_definition(&self, other: &Table) -> bool {
        self.tag == other.tag
            && self.is_global == other.is_global
            && self.fields == other.fields
            && self.item_attributes == other.item_attributes
            && self.description == other.description
    }

    /// Validates a table tag.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TagLength`] if the tag is empty or longer than
    /// [`MAX_TAG_LEN`], and [`ModelError::InvalidIdentifier`] if the tag or
    /// the derived list element name is not a valid identifier.
    pub fn validate_tag(tag: &str) -> ModelResult<()> {
        let len = tag.chars().count();
        if len == 0 || len > MAX_TAG_LEN {
            return Err(ModelError::TagLength {
                len,
                max: MAX_TAG_LEN,
            });
        }
        if !is_valid_identifier(tag) || !is_valid_identifier(&format!("{tag}_list")) {
            return Err(ModelError::invalid_identifier(tag));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_grammar() {
        assert!(is_valid_identifier("state"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("city.name-2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier("xmlthing"));
        assert!(!is_valid_identifier("XMLthing"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier(" lead"));
        assert!(!is_valid_identifier("a<b"));
    }

    #[test]
    fn validate_tag_length() {
        assert!(Table::validate_tag("states").is_ok());
        assert_eq!(
            Table::validate_tag(""),
            Err(ModelError::TagLength { len: 0, max: 31 })
        );
        let long = "a".repeat(32);
        assert!(matches!(
            Table::validate_tag(&long),
            Err(ModelError::TagLength { len: 32, .. })
        ));
        assert!(Table::validate_tag(&"a".repeat(31)).is_ok());
    }

    #[test]
    fn validate_tag_grammar() {
        assert!(matches!(
            Table::validate_tag("9lives"),
            Err(ModelError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn fields_in_declared_order() {
        let table = Table::new("d", "prices")
            .with_field(FieldDef::new("name").with_properties(["lang"]))
            .with_field(FieldDef::new("price").indexed(true));
        assert_eq!(table.fields_without_attributes(), vec!["name", "price"]);
        assert!(table.field("price").unwrap().is_indexed);
        assert!(table.field("name").unwrap().has_properties());
        assert!(table.field("missing").is_none());
    }

    #[test]
    fn same_definition_ignores_identity() {
        let a = Table::new("d1", "t").with_field(FieldDef::new("x"));
        let b = Table::new("d2", "t").with_field(FieldDef::new("x"));
        assert!(a.same_definition(&b));
        let c = b.clone().global(true);
        assert!(!a.same_definition(&c));
    }

    #[test]
    fn serde_defaults() {
        let json = r#"{"id":"0fb6c422115145c0a651bb9a34ca09c4","domain":"d","tag":"t"}"#;
        let table: Table = serde_json::from_str(json).unwrap();
        assert!(!table.is_global);
        assert!(table.fields.is_empty());
        assert_eq!(table.description, "");
    }
}
