//! Property-based test generators using proptest.
//!
//! Tables come with valid tags and field names that cannot collide with the
//! reserved snapshot columns; rows always carry a value for every declared
//! field, property and attribute, so they survive an export and re-import
//! unchanged.

use lookup_core::schema::{
    field_indexed_column, field_properties_column, flag_cell, RowDict, Workbook, Worksheet,
    FIELD_COLUMN, IS_GLOBAL_COLUMN, PROPERTY_COLUMN, TABLE_ID_COLUMN, TYPES_SHEET,
};
use lookup_model::{is_valid_identifier, FieldDef, FieldValue, Row, Table};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Strategy for generating valid identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,10}")
        .expect("Invalid regex")
        .prop_filter("Identifier must be valid", |s| is_valid_identifier(s))
}

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("f_[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for generating cell values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 ]{0,8}").expect("Invalid regex")
}

fn names(pattern: &str, max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(
        prop::string::string_regex(pattern).expect("Invalid regex"),
        0..=max,
    )
    .prop_map(|set: BTreeSet<String>| set.into_iter().collect())
}

/// Strategy for generating a field definition with up to two properties.
pub fn field_def_strategy() -> impl Strategy<Value = FieldDef> {
    (field_name_strategy(), names("p_[a-z]{1,4}", 2), any::<bool>()).prop_map(
        |(name, properties, indexed)| FieldDef::new(name).with_properties(properties).indexed(indexed),
    )
}

/// Strategy for generating a table in `domain` with one to four fields.
pub fn table_strategy(domain: &str) -> impl Strategy<Value = Table> {
    let domain = domain.to_string();
    (
        identifier_strategy(),
        any::<bool>(),
        prop::collection::vec(field_def_strategy(), 1..=4),
        names("a_[a-z]{1,4}", 2),
    )
        .prop_map(move |(tag, is_global, fields, attributes)| {
            let mut seen = BTreeSet::new();
            let mut table = Table::new(domain.clone(), tag)
                .global(is_global)
                .with_item_attributes(attributes);
            for field in fields {
                if seen.insert(field.name.clone()) {
                    table = table.with_field(field);
                }
            }
            table
        })
}

fn field_values_strategy(field: &FieldDef) -> BoxedStrategy<Vec<FieldValue>> {
    if !field.has_properties() {
        return value_strategy().prop_map(|v| vec![FieldValue::new(v)]).boxed();
    }
    let properties = field.properties.clone();
    let entry = (
        value_strategy(),
        prop::collection::vec(value_strategy(), properties.len()),
    )
        .prop_map(move |(value, props)| {
            properties
                .iter()
                .zip(props)
                .fold(FieldValue::new(value), |fv, (name, p)| fv.with_property(name, p))
        });
    prop::collection::vec(entry, 0..3).boxed()
}

/// Strategy for generating one row of `table`.
pub fn row_strategy(table: &Table) -> BoxedStrategy<Row> {
    let fields: Vec<BoxedStrategy<(String, Vec<FieldValue>)>> = table
        .fields
        .iter()
        .map(|f| {
            let name = f.name.clone();
            field_values_strategy(f)
                .prop_map(move |values| (name.clone(), values))
                .boxed()
        })
        .collect();
    let attributes = prop::collection::vec(value_strategy(), table.item_attributes.len());
    let names = table.item_attributes.clone();
    let (domain, table_id) = (table.domain.clone(), table.id);
    (fields, attributes)
        .prop_map(move |(fields, values)| {
            let mut row = Row::new(domain.clone(), table_id);
            row.fields = fields.into_iter().collect();
            row.item_attributes = names.iter().cloned().zip(values).collect();
            row
        })
        .boxed()
}

/// Strategy for generating up to `max` rows of `table`, with sort keys in
/// order.
pub fn rows_strategy(table: &Table, max: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(row_strategy(table), 0..=max).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| row.with_sort_key(i as i64))
            .collect()
    })
}

/// Strategy for generating a table together with its rows.
pub fn table_with_rows_strategy(domain: &str, max_rows: usize) -> impl Strategy<Value = (Table, Vec<Row>)> {
    table_strategy(domain).prop_flat_map(move |table| {
        let rows = rows_strategy(&table, max_rows);
        (Just(table), rows)
    })
}

fn strings<'a>(items: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(items.into_iter().cloned().map(Value::String).collect())
}

/// Builds an import snapshot for one table, without UIDs.
pub fn workbook_for(table: &Table, rows: &[Row]) -> Workbook {
    let mut types = Map::new();
    types.insert(TABLE_ID_COLUMN.into(), Value::String(table.tag.clone()));
    types.insert(IS_GLOBAL_COLUMN.into(), flag_cell(table.is_global));
    types.insert(FIELD_COLUMN.into(), strings(table.fields.iter().map(|f| &f.name)));
    for (i, field) in table.fields.iter().enumerate() {
        if field.has_properties() {
            let mut props = Map::new();
            props.insert(PROPERTY_COLUMN.into(), strings(&field.properties));
            types.insert(field_properties_column(i + 1), Value::Object(props));
        }
        types.insert(field_indexed_column(i + 1), flag_cell(field.is_indexed));
    }
    types.insert(PROPERTY_COLUMN.into(), strings(&table.item_attributes));

    let data = rows.iter().map(|row| data_row(table, row)).collect();
    Workbook::new()
        .with_sheet(Worksheet::new(TYPES_SHEET).with_row(types))
        .with_sheet(Worksheet {
            title: table.tag.clone(),
            rows: data,
        })
}

fn data_row(table: &Table, row: &Row) -> RowDict {
    let mut out = Map::new();
    let mut fields = Map::new();
    for field in &table.fields {
        let values = row.field_list(&field.name);
        if !field.has_properties() {
            let value = values.first().map(|v| v.value.clone()).unwrap_or_default();
            fields.insert(field.name.clone(), Value::String(value));
            continue;
        }
        fields.insert(field.name.clone(), strings(values.iter().map(|v| &v.value)));
        let props = field
            .properties
            .iter()
            .map(|p| {
                let column = values
                    .iter()
                    .map(|v| Value::String(v.properties.get(p).cloned().unwrap_or_default()))
                    .collect();
                (p.clone(), Value::Array(column))
            })
            .collect();
        out.insert(field.name.clone(), Value::Object(props));
    }
    out.insert(FIELD_COLUMN.into(), Value::Object(fields));
    let attributes = row
        .item_attributes
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    out.insert(PROPERTY_COLUMN.into(), Value::Object(attributes));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_core::schema::validate;

    proptest! {
        #[test]
        fn generated_tags_are_valid(table in table_strategy("d")) {
            prop_assert!(Table::validate_tag(&table.tag).is_ok());
            prop_assert!(!table.fields.is_empty());
        }

        #[test]
        fn generated_snapshots_validate((table, rows) in table_with_rows_strategy("d", 5)) {
            let workbook = workbook_for(&table, &rows);
            let snapshot = validate(&workbook, false);
            prop_assert!(snapshot.is_ok(), "{:?}", snapshot.err().map(|e| e.messages()));
        }
    }
}
