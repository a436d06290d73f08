//! Table definitions read from the types sheet.

use super::snapshot::{cell_flag, cell_list, cell_names, cell_str, is_delete_marked, uid, RowDict};
use super::violation::{SchemaErrors, SchemaViolation};
use lookup_model::{is_valid_identifier, FieldDef, Table, TableId};

/// Column holding the table tag.
pub const TABLE_ID_COLUMN: &str = "table_id";
/// Older name of the tag column.
pub const TAG_COLUMN: &str = "tag";
/// Column holding the field names.
pub const FIELD_COLUMN: &str = "field";
/// Column holding the item attribute names.
pub const PROPERTY_COLUMN: &str = "property";
/// Column holding the global flag.
pub const IS_GLOBAL_COLUMN: &str = "is_global";
/// Column holding the description.
pub const DESCRIPTION_COLUMN: &str = "description";

/// Column declaring the properties of the `n`th field (1-based).
#[must_use]
pub fn field_properties_column(n: usize) -> String {
    format!("field {n}")
}

/// Column flagging the `n`th field (1-based) as indexed.
#[must_use]
pub fn field_indexed_column(n: usize) -> String {
    format!("field {n}: is_indexed?")
}

/// One row of the types sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    /// Table tag.
    pub tag: String,
    /// Global flag.
    pub is_global: bool,
    /// Declared fields in column order.
    pub fields: Vec<FieldDef>,
    /// Declared item attributes.
    pub item_attributes: Vec<String>,
    /// Description.
    pub description: String,
    /// Out-of-band table id.
    pub uid: Option<String>,
    /// Whether the row asks for the table to be deleted.
    pub delete: bool,
}

impl TableDefinition {
    /// Reads a types sheet row, recording every problem found.
    ///
    /// Returns `None` only if the row has no tag at all.
    pub fn from_row(row: &RowDict, errors: &mut SchemaErrors) -> Option<Self> {
        let Some(tag) = row
            .get(TABLE_ID_COLUMN)
            .or_else(|| row.get(TAG_COLUMN))
            .and_then(cell_str)
            .map(|t| t.trim().to_string())
        else {
            errors.push(SchemaViolation::MissingTypesColumn {
                column: TABLE_ID_COLUMN.to_string(),
            });
            return None;
        };
        let delete = is_delete_marked(row);

        if let Err(err) = Table::validate_tag(&tag) {
            errors.push(SchemaViolation::InvalidTag {
                tag: tag.clone(),
                reason: err.to_string(),
            });
        }

        let field_names = row.get(FIELD_COLUMN).map(cell_names).unwrap_or_default();
        let item_attributes = row.get(PROPERTY_COLUMN).map(cell_names).unwrap_or_default();
        if field_names.is_empty() && item_attributes.is_empty() && !delete {
            errors.push(SchemaViolation::NeitherFieldsNorAttributes { tag: tag.clone() });
        }

        let mut fields = Vec::with_capacity(field_names.len());
        for (i, name) in field_names.into_iter().enumerate() {
            if !is_valid_identifier(&name) {
                errors.push(SchemaViolation::InvalidFieldName {
                    tag: tag.clone(),
                    field: name.clone(),
                });
            }
            let prop_key = field_properties_column(i + 1);
            let properties = match row.get(&prop_key) {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(cell) => match cell.get(PROPERTY_COLUMN).and_then(cell_list) {
                    Some(props) => props,
                    None => {
                        errors.push(SchemaViolation::WrongPropertySyntax {
                            prop_key: prop_key.clone(),
                        });
                        Vec::new()
                    }
                },
            };
            let indexed_key = field_indexed_column(i + 1);
            let is_indexed = cell_flag(row.get(&indexed_key)).unwrap_or_else(|| {
                errors.push(SchemaViolation::InvalidFlag {
                    tag: tag.clone(),
                    column: indexed_key.clone(),
                });
                false
            });
            fields.push(FieldDef {
                name,
                properties,
                is_indexed,
            });
        }

        let is_global = cell_flag(row.get(IS_GLOBAL_COLUMN)).unwrap_or_else(|| {
            errors.push(SchemaViolation::InvalidFlag {
                tag: tag.clone(),
                column: IS_GLOBAL_COLUMN.to_string(),
            });
            false
        });
        let description = row
            .get(DESCRIPTION_COLUMN)
            .and_then(cell_str)
            .unwrap_or_default();

        Some(Self {
            tag,
            is_global,
            fields,
            item_attributes,
            description,
            uid: uid(row),
            delete,
        })
    }

    /// Builds the table this definition describes.
    #[must_use]
    pub fn to_table(&self, domain: &str, id: TableId) -> Table {
        Table {
            id,
            domain: domain.to_string(),
            tag: self.tag.clone(),
            is_global: self.is_global,
            fields: self.fields.clone(),
            item_attributes: self.item_attributes.clone(),
            description: self.description.clone(),
        }
    }
}
