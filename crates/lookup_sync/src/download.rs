//! Export of tables to a snapshot that imports back unchanged.

use crate::error::{SyncError, SyncResult};
use crate::service::LookupService;
use lookup_core::schema::{
    field_indexed_column, field_properties_column, flag_cell, RowDict, Workbook, Worksheet,
    DELETE_HEADER, DESCRIPTION_COLUMN, FIELD_COLUMN, IS_GLOBAL_COLUMN, PROPERTY_COLUMN,
    TABLE_ID_COLUMN, TYPES_SHEET, UID_HEADER,
};
use lookup_core::OwnershipIndex;
use lookup_model::{OwnerType, Row, RowId, RowOwner, Table};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;

fn strings<'a>(items: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(items.into_iter().cloned().map(Value::String).collect())
}

fn type_row(table: &Table) -> RowDict {
    let mut row = Map::new();
    row.insert(DELETE_HEADER.into(), Value::String("N".into()));
    row.insert(TABLE_ID_COLUMN.into(), Value::String(table.tag.clone()));
    row.insert(IS_GLOBAL_COLUMN.into(), flag_cell(table.is_global));
    row.insert(
        FIELD_COLUMN.into(),
        strings(table.fields.iter().map(|f| &f.name)),
    );
    for (i, field) in table.fields.iter().enumerate() {
        let mut props = Map::new();
        props.insert(PROPERTY_COLUMN.into(), strings(&field.properties));
        row.insert(field_properties_column(i + 1), Value::Object(props));
        row.insert(field_indexed_column(i + 1), flag_cell(field.is_indexed));
    }
    row.insert(PROPERTY_COLUMN.into(), strings(&table.item_attributes));
    row.insert(DESCRIPTION_COLUMN.into(), Value::String(table.description.clone()));
    row.insert(UID_HEADER.into(), Value::String(table.id.to_string()));
    row
}

fn data_row(
    table: &Table,
    row: &Row,
    owners: &[RowOwner],
    names: &OwnershipIndex<'_>,
) -> RowDict {
    let mut out = Map::new();
    out.insert(UID_HEADER.into(), Value::String(row.id.to_string()));
    out.insert(DELETE_HEADER.into(), Value::String("N".into()));

    let mut fields = Map::new();
    for field in &table.fields {
        let values = row.field_list(&field.name);
        if !field.has_properties() {
            let value = values.first().map(|v| v.value.clone()).unwrap_or_default();
            fields.insert(field.name.clone(), Value::String(value));
            continue;
        }
        fields.insert(field.name.clone(), strings(values.iter().map(|v| &v.value)));
        let props: Map<String, Value> = field
            .properties
            .iter()
            .map(|prop| {
                let column = values
                    .iter()
                    .map(|v| Value::String(v.properties.get(prop).cloned().unwrap_or_default()))
                    .collect();
                (prop.clone(), Value::Array(column))
            })
            .collect();
        out.insert(field.name.clone(), Value::Object(props));
    }
    out.insert(FIELD_COLUMN.into(), Value::Object(fields));

    let attributes: Map<String, Value> = table
        .item_attributes
        .iter()
        .map(|name| {
            let value = row.item_attributes.get(name).cloned().unwrap_or_default();
            (name.clone(), Value::String(value))
        })
        .collect();
    out.insert(PROPERTY_COLUMN.into(), Value::Object(attributes));

    // Global tables keep the owner columns, empty.
    let owners = if table.is_global { &[][..] } else { owners };
    for kind in OwnerType::ALL {
        let column = owners
            .iter()
            .filter(|o| o.owner_type == kind)
            .map(|o| Value::String(names.display_name(kind, &o.owner_id)))
            .collect();
        out.insert(kind.as_str().into(), Value::Array(column));
    }
    out
}

impl LookupService {
    /// Exports tables of a domain.
    ///
    /// The `types` sheet comes first, then one sheet per table in tag order.
    /// An empty `tags` list exports every table.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TableNotFound`] if a requested tag does not
    /// exist, or an error if the store cannot be read.
    pub fn export(&self, domain: &str, tags: &[String]) -> SyncResult<Workbook> {
        let relational = self.adapter().relational();
        let mut tables = relational.tables_for_domain(domain)?;
        if !tags.is_empty() {
            if let Some(missing) = tags.iter().find(|t| !tables.iter().any(|table| &table.tag == *t)) {
                return Err(SyncError::TableNotFound {
                    domain: domain.to_string(),
                    table: missing.clone(),
                });
            }
            tables.retain(|t| tags.contains(&t.tag));
        }

        let names = OwnershipIndex::new(self.directory(), domain);
        let mut types = Worksheet::new(TYPES_SHEET);
        let mut sheets = Vec::with_capacity(tables.len());
        for table in &tables {
            types.rows.push(type_row(table));
            let mut owners: HashMap<RowId, Vec<RowOwner>> = HashMap::new();
            for owner in relational.owners_for_table(table.id)? {
                owners.entry(owner.row_id).or_default().push(owner);
            }
            let mut sheet = Worksheet::new(&table.tag);
            for row in relational.rows_for_table(table.id)? {
                let row_owners = owners.get(&row.id).map_or(&[][..], Vec::as_slice);
                sheet.rows.push(data_row(table, &row, row_owners, &names));
            }
            sheets.push(sheet);
        }

        info!(domain, tables = tables.len(), "exported tables");
        let mut workbook = Workbook::new().with_sheet(types);
        workbook.sheets.extend(sheets);
        Ok(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_model::{FieldDef, FieldValue};
    use serde_json::json;

    #[test]
    fn type_row_mirrors_import_grammar() {
        let table = Table::new("d", "states")
            .with_field(FieldDef::new("name").with_properties(["lang"]))
            .with_item_attributes(["code"]);
        let row = type_row(&table);
        assert_eq!(row["table_id"], json!("states"));
        assert_eq!(row["is_global"], json!("no"));
        assert_eq!(row["field"], json!(["name"]));
        assert_eq!(row["field 1"], json!({"property": ["lang"]}));
        assert_eq!(row["field 1: is_indexed?"], json!("no"));
        assert_eq!(row["property"], json!(["code"]));
        assert_eq!(row["UID"], json!(table.id.to_string()));
    }

    #[test]
    fn property_fields_export_parallel_lists() {
        let directory = lookup_core::InMemoryDirectory::new();
        let names = OwnershipIndex::new(&directory, "d");
        let table = Table::new("d", "states")
            .with_field(FieldDef::new("code"))
            .with_field(FieldDef::new("name").with_properties(["lang"]))
            .with_item_attributes(["size"]);
        let row = Row::new("d", table.id).with_value("code", "OH").with_values(
            "name",
            vec![
                FieldValue::new("Ohio").with_property("lang", "en"),
                FieldValue::new("Ohio-fr").with_property("lang", "fr"),
            ],
        );
        let owners = [RowOwner::new("d", row.id, OwnerType::User, "u-404")];
        let out = data_row(&table, &row, &owners, &names);
        assert_eq!(out["field"], json!({"code": "OH", "name": ["Ohio", "Ohio-fr"]}));
        assert_eq!(out["name"], json!({"lang": ["en", "fr"]}));
        assert_eq!(out["property"], json!({"size": ""}));
        assert_eq!(out["user"], json!(["u-404"]));
        assert_eq!(out["group"], json!([]));
    }

    #[test]
    fn global_table_keeps_empty_owner_columns() {
        let directory = lookup_core::InMemoryDirectory::new();
        let names = OwnershipIndex::new(&directory, "d");
        let table = Table::new("d", "states")
            .with_field(FieldDef::new("code"))
            .global(true);
        let row = Row::new("d", table.id).with_value("code", "OH");
        let owners = [RowOwner::new("d", row.id, OwnerType::User, "u-1")];
        let out = data_row(&table, &row, &owners, &names);
        for kind in OwnerType::ALL {
            assert_eq!(out[kind.as_str()], json!([]), "{kind}");
        }
    }
}
