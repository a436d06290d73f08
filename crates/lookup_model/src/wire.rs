//! Row field wire shape shared by the API, export and the relational store.
//!
//! ```json
//! {"name": {"field_list": [{"field_value": "Ohio", "properties": {"lang": "en"}}]}}
//! ```

use crate::error::{ModelError, ModelResult};
use crate::row::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire wrapper around the values of one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldList {
    /// Values in order.
    #[serde(default)]
    pub field_list: Vec<FieldValue>,
}

/// Field map type as held by [`crate::Row`].
pub type FieldMap = BTreeMap<String, Vec<FieldValue>>;

/// Converts a field map to its JSON wire value.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn fields_to_value(fields: &FieldMap) -> ModelResult<serde_json::Value> {
    let wire: BTreeMap<&str, FieldList> = fields
        .iter()
        .map(|(name, values)| {
            (
                name.as_str(),
                FieldList {
                    field_list: values.clone(),
                },
            )
        })
        .collect();
    serde_json::to_value(wire).map_err(|e| ModelError::malformed("", e.to_string()))
}

/// Parses a JSON wire value into a field map.
///
/// # Errors
///
/// Returns [`ModelError::MalformedDocument`] if the value is not in wire shape.
pub fn fields_from_value(value: serde_json::Value) -> ModelResult<FieldMap> {
    let wire: BTreeMap<String, FieldList> =
        serde_json::from_value(value).map_err(|e| ModelError::malformed("", e.to_string()))?;
    Ok(wire
        .into_iter()
        .map(|(name, list)| (name, list.field_list))
        .collect())
}

/// `#[serde(with = "crate::wire::fields")]` adapter.
pub mod fields {
    use super::{FieldList, FieldMap};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    /// Serializes a field map in wire shape.
    pub fn serialize<S: Serializer>(fields: &FieldMap, serializer: S) -> Result<S::Ok, S::Error> {
        let wire: BTreeMap<&str, FieldList> = fields
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str(),
                    FieldList {
                        field_list: v.clone(),
                    },
                )
            })
            .collect();
        wire.serialize(serializer)
    }

    /// Deserializes a field map from wire shape.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldMap, D::Error> {
        let wire = BTreeMap::<String, FieldList>::deserialize(deserializer)?;
        Ok(wire.into_iter().map(|(k, v)| (k, v.field_list)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_property_field_has_empty_properties() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), vec![FieldValue::new("Ohio")]);
        let value = fields_to_value(&fields).unwrap();
        assert_eq!(
            value,
            json!({"name": {"field_list": [{"field_value": "Ohio", "properties": {}}]}})
        );
    }

    #[test]
    fn parses_missing_properties_as_empty() {
        let value = json!({"qty": {"field_list": [{"field_value": "5"}]}});
        let fields = fields_from_value(value).unwrap();
        assert_eq!(fields["qty"], vec![FieldValue::new("5")]);
    }

    #[test]
    fn rejects_scalar_fields() {
        let value = json!({"qty": "5"});
        assert!(matches!(
            fields_from_value(value),
            Err(ModelError::MalformedDocument { .. })
        ));
    }
}
