//! Rows of a table's data sheet.

use super::definition::{TableDefinition, FIELD_COLUMN, PROPERTY_COLUMN};
use super::snapshot::{cell_list, cell_names, cell_str, is_delete_marked, uid, RowDict};
use super::violation::{SchemaErrors, SchemaViolation};
use crate::ownership::OwnerSpec;
use lookup_model::wire::FieldMap;
use lookup_model::{FieldValue, OwnerType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One data sheet row, parsed against its table definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRow {
    /// Out-of-band row id.
    pub uid: Option<String>,
    /// Whether the row asks for deletion.
    pub delete: bool,
    /// Field values.
    pub fields: FieldMap,
    /// Item attributes.
    pub item_attributes: BTreeMap<String, String>,
    /// Owner names per kind.
    pub owners: OwnerSpec,
}

fn object<'a>(row: &'a RowDict, key: &str) -> Option<&'a Map<String, Value>> {
    row.get(key).and_then(Value::as_object)
}

fn check_columns<'a>(
    tag: &str,
    declared: impl Iterator<Item = &'a str> + Clone,
    present: Option<&Map<String, Value>>,
    errors: &mut SchemaErrors,
) {
    for name in declared.clone() {
        if !present.is_some_and(|p| p.contains_key(name)) {
            errors.push(SchemaViolation::MissingColumn {
                tag: tag.to_string(),
                field: name.to_string(),
            });
        }
    }
    for name in present.into_iter().flat_map(Map::keys) {
        if !declared.clone().any(|d| d == name) {
            errors.push(SchemaViolation::ExtraColumn {
                tag: tag.to_string(),
                field: name.clone(),
            });
        }
    }
}

/// Checks one data sheet row, recording every problem found.
///
/// Rows marked for deletion only need their UID and are not checked.
pub fn check_data_row(def: &TableDefinition, row: &RowDict, replace: bool, errors: &mut SchemaErrors) {
    let tag = def.tag.as_str();
    if is_delete_marked(row) {
        return;
    }
    if replace && uid(row).is_some() {
        errors.push(SchemaViolation::ReplaceWithUid { tag: tag.to_string() });
    }

    let fields = object(row, FIELD_COLUMN);
    check_columns(
        tag,
        def.fields.iter().map(|f| f.name.as_str()),
        fields,
        errors,
    );
    check_columns(
        tag,
        def.item_attributes.iter().map(String::as_str),
        object(row, PROPERTY_COLUMN),
        errors,
    );

    for field in &def.fields {
        let Some(value) = fields.and_then(|f| f.get(&field.name)) else {
            continue;
        };
        if !field.has_properties() {
            if cell_str(value).is_none() {
                errors.push(SchemaViolation::InvalidFieldValue {
                    tag: tag.to_string(),
                    field: field.name.clone(),
                });
            }
            continue;
        }
        let Some(values) = cell_list(value) else {
            errors.push(SchemaViolation::InvalidFieldSyntax {
                tag: tag.to_string(),
                field: field.name.clone(),
            });
            continue;
        };
        let sheet_props = object(row, &field.name);
        for prop in &field.properties {
            if !sheet_props.is_some_and(|p| p.contains_key(prop)) {
                errors.push(SchemaViolation::MissingProperty {
                    tag: tag.to_string(),
                    property: prop.clone(),
                    field: field.name.clone(),
                });
            }
        }
        for (prop, prop_value) in sheet_props.into_iter().flatten() {
            if !field.properties.contains(prop) {
                errors.push(SchemaViolation::ExtraProperty {
                    tag: tag.to_string(),
                    property: prop.clone(),
                    field: field.name.clone(),
                });
                continue;
            }
            match cell_list(prop_value) {
                None => errors.push(SchemaViolation::InvalidProperty {
                    tag: tag.to_string(),
                    field: field.name.clone(),
                    prop: prop.clone(),
                }),
                Some(list) if list.len() != values.len() => {
                    errors.push(SchemaViolation::WrongFieldPropertyCombos {
                        tag: tag.to_string(),
                        field: field.name.clone(),
                        prop: prop.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }
}

/// Parses a data sheet row that passed [`check_data_row`].
///
/// Field values follow the declared field order; a field with properties
/// yields one [`FieldValue`] per list entry, carrying the entry at the same
/// index of every property list.
#[must_use]
pub fn parse_data_row(def: &TableDefinition, row: &RowDict) -> DataRow {
    let sheet_fields = object(row, FIELD_COLUMN);
    let mut fields = FieldMap::new();
    for field in &def.fields {
        let Some(value) = sheet_fields.and_then(|f| f.get(&field.name)) else {
            continue;
        };
        let values = if field.has_properties() {
            let props = object(row, &field.name);
            cell_list(value)
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let mut fv = FieldValue::new(v);
                    for prop in &field.properties {
                        let entry = props
                            .and_then(|p| p.get(prop))
                            .and_then(cell_list)
                            .and_then(|list| list.into_iter().nth(i));
                        if let Some(entry) = entry {
                            fv.properties.insert(prop.clone(), entry);
                        }
                    }
                    fv
                })
                .collect()
        } else {
            vec![FieldValue::new(cell_str(value).unwrap_or_default())]
        };
        fields.insert(field.name.clone(), values);
    }

    let item_attributes = object(row, PROPERTY_COLUMN)
        .map(|attrs| {
            attrs
                .iter()
                .filter(|(name, _)| def.item_attributes.contains(name))
                .map(|(name, v)| (name.clone(), cell_str(v).unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    let mut owners = OwnerSpec::default();
    for kind in OwnerType::ALL {
        if let Some(value) = row.get(kind.as_str()) {
            owners.set(kind, cell_names(value));
        }
    }

    DataRow {
        uid: uid(row),
        delete: is_delete_marked(row),
        fields,
        item_attributes,
        owners,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_model::FieldDef;
    use serde_json::json;

    fn def() -> TableDefinition {
        TableDefinition {
            tag: "prices".into(),
            is_global: false,
            fields: vec![
                FieldDef::new("name"),
                FieldDef::new("qty").with_properties(["lang"]),
            ],
            item_attributes: vec!["code".into()],
            description: String::new(),
            uid: None,
            delete: false,
        }
    }

    fn row(value: Value) -> RowDict {
        serde_json::from_value(value).unwrap()
    }

    fn check(value: Value, replace: bool) -> Vec<String> {
        let mut errors = SchemaErrors::default();
        check_data_row(&def(), &row(value), replace, &mut errors);
        errors.messages()
    }

    #[test]
    fn valid_row_parses() {
        let r = row(json!({
            "field": {"name": "Ohio", "qty": ["5", "cinq"]},
            "qty": {"lang": ["en", "fr"]},
            "property": {"code": 7},
            "user": ["alice"],
        }));
        let mut errors = SchemaErrors::default();
        check_data_row(&def(), &r, false, &mut errors);
        assert!(errors.is_empty(), "{:?}", errors.messages());

        let parsed = parse_data_row(&def(), &r);
        assert_eq!(parsed.fields["name"], vec![FieldValue::new("Ohio")]);
        assert_eq!(
            parsed.fields["qty"],
            vec![
                FieldValue::new("5").with_property("lang", "en"),
                FieldValue::new("cinq").with_property("lang", "fr"),
            ]
        );
        assert_eq!(parsed.item_attributes["code"], "7");
        assert_eq!(parsed.owners.users, Some(vec!["alice".to_string()]));
        assert_eq!(parsed.owners.groups, None);
    }

    #[test]
    fn scalar_where_list_expected_is_one_error() {
        let messages = check(
            json!({"field": {"name": "Ohio", "qty": "5"}, "property": {"code": "x"}}),
            false,
        );
        assert_eq!(
            messages,
            vec!["Fields with attributes should be numbered as 'field: qty integer'"]
        );
    }

    #[test]
    fn missing_and_extra_columns_are_distinct() {
        let messages = check(
            json!({"field": {"qty": ["1"], "colour": "red"}, "qty": {"lang": ["en"]}, "property": {"code": "x"}}),
            false,
        );
        assert_eq!(
            messages,
            vec![
                "Excel-sheet 'prices' does not contain the column 'name' as specified in its 'types' definition",
                "Excel-sheet 'prices' has an extra column 'colour' that's not defined in its 'types' definition",
            ]
        );
    }

    #[test]
    fn property_problems() {
        let messages = check(
            json!({"field": {"name": "a", "qty": ["1", "2"]}, "qty": {"lang": ["en"], "dialect": ["x"]}, "property": {"code": "x"}}),
            false,
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("should be same"));
        assert!(messages[1].contains("extra property 'dialect'"));

        let messages = check(
            json!({"field": {"name": "a", "qty": ["1"]}, "qty": {"lang": "en"}, "property": {"code": "x"}}),
            false,
        );
        assert_eq!(messages, vec!["Attribute should be written as 'qty: lang integer'"]);

        let messages = check(
            json!({"field": {"name": "a", "qty": ["1"]}, "property": {"code": "x"}}),
            false,
        );
        assert!(messages[0].contains("does not contain property 'lang'"));
    }

    #[test]
    fn uid_in_replace_mode() {
        let messages = check(
            json!({"UID": "abc", "field": {"name": "a", "qty": ["1"]}, "qty": {"lang": ["en"]}, "property": {"code": "x"}}),
            true,
        );
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Rows shouldn't contain UIDs"));
    }

    #[test]
    fn delete_rows_skip_checks() {
        assert!(check(json!({"UID": "abc", "Delete(Y/N)": "Y"}), false).is_empty());
    }
}
