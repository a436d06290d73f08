//! Structural problems found in a snapshot.

use thiserror::Error;

/// One structural problem. Messages name the offending sheet, column or row.
#[derive(Debug, Error, Clone, PartialEq, Eq, Hash)]
pub enum SchemaViolation {
    /// A required sheet is absent.
    #[error("Workbook does not contain a sheet called '{title}'")]
    MissingSheet {
        /// Sheet title.
        title: String,
    },

    /// The types sheet has no table id column.
    #[error("Workbook 'types' has no column '{column}'.")]
    MissingTypesColumn {
        /// Column name.
        column: String,
    },

    /// A table has neither fields nor item attributes.
    #[error("Lookup-tables can not have empty fields and empty properties on items. table_id '{tag}' has no fields and no properties")]
    NeitherFieldsNorAttributes {
        /// Table tag.
        tag: String,
    },

    /// Two type rows share a tag.
    #[error("Lookup-tables should have unique 'table_id'. There are two rows with table_id '{tag}' in 'types' sheet.")]
    DuplicateTag {
        /// Table tag.
        tag: String,
    },

    /// A tag is not usable as an identifier or has the wrong length.
    #[error("Invalid table_id '{tag}': {reason}")]
    InvalidTag {
        /// Table tag.
        tag: String,
        /// Why it is invalid.
        reason: String,
    },

    /// A field name is not usable as an identifier.
    #[error("\"{field}\" cannot include special characters, begin or end with a space, or begin with \"xml\" or a number")]
    InvalidFieldName {
        /// Table tag.
        tag: String,
        /// Field name.
        field: String,
    },

    /// A `field <n>` column is not a property list.
    #[error("Properties should be specified as 'field 1: property 1'. In 'types' sheet, '{prop_key}' is not correctly formatted")]
    WrongPropertySyntax {
        /// Column name.
        prop_key: String,
    },

    /// A yes/no column holds something else.
    #[error("In 'types' sheet, column '{column}' of table_id '{tag}' should be 'yes' or 'no'")]
    InvalidFlag {
        /// Table tag.
        tag: String,
        /// Column name.
        column: String,
    },

    /// A data sheet lacks a declared field or item attribute.
    #[error("Excel-sheet '{tag}' does not contain the column '{field}' as specified in its 'types' definition")]
    MissingColumn {
        /// Table tag.
        tag: String,
        /// Column name.
        field: String,
    },

    /// A data sheet has an undeclared field or item attribute.
    #[error("Excel-sheet '{tag}' has an extra column '{field}' that's not defined in its 'types' definition")]
    ExtraColumn {
        /// Table tag.
        tag: String,
        /// Column name.
        field: String,
    },

    /// A data sheet lacks a declared property of a field.
    #[error("Excel-sheet '{tag}' does not contain property '{property}' of the field '{field}' as specified in its 'types' definition")]
    MissingProperty {
        /// Table tag.
        tag: String,
        /// Property name.
        property: String,
        /// Field name.
        field: String,
    },

    /// A data sheet has an undeclared property for a field.
    #[error("Excel-sheet '{tag}' has an extra property '{property}' for the field '{field}' that's not defined in its 'types' definition. Re-check the formatting")]
    ExtraProperty {
        /// Table tag.
        tag: String,
        /// Property name.
        property: String,
        /// Field name.
        field: String,
    },

    /// A field with properties holds a scalar instead of a numbered list.
    #[error("Fields with attributes should be numbered as 'field: {field} integer'")]
    InvalidFieldSyntax {
        /// Table tag.
        tag: String,
        /// Field name.
        field: String,
    },

    /// A field without properties holds a list or object.
    #[error("Excel-sheet '{tag}' has an invalid value in column '{field}'")]
    InvalidFieldValue {
        /// Table tag.
        tag: String,
        /// Field name.
        field: String,
    },

    /// A property column holds a scalar instead of a numbered list.
    #[error("Attribute should be written as '{field}: {prop} integer'")]
    InvalidProperty {
        /// Table tag.
        tag: String,
        /// Field name.
        field: String,
        /// Property name.
        prop: String,
    },

    /// A property list and its field list differ in length.
    #[error("Number of values for field '{field}' and attribute '{prop}' should be same")]
    WrongFieldPropertyCombos {
        /// Table tag.
        tag: String,
        /// Field name.
        field: String,
        /// Property name.
        prop: String,
    },

    /// A row carries a UID while the upload replaces the table.
    #[error("Rows shouldn't contain UIDs while using replace option. Excel sheet '{tag}' contains UID in a row.")]
    ReplaceWithUid {
        /// Table tag.
        tag: String,
    },
}

/// Every violation of a snapshot, in first-seen order without repeats.
#[derive(Debug, Error, Clone, Default, PartialEq, Eq)]
#[error("Uploaded snapshot has {} formatting problem(s): {}", .violations.len(), join(.violations))]
pub struct SchemaErrors {
    /// The violations.
    pub violations: Vec<SchemaViolation>,
}

fn join(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaErrors {
    /// Records a violation unless an identical one was already recorded.
    pub fn push(&mut self, violation: SchemaViolation) {
        if !self.violations.contains(&violation) {
            self.violations.push(violation);
        }
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Renders every violation.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// Returns `Ok(value)` if nothing was recorded, `Err(self)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `self` if any violation was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, SchemaErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_deduplicates_in_first_seen_order() {
        let mut errors = SchemaErrors::default();
        let a = SchemaViolation::MissingColumn {
            tag: "t".into(),
            field: "x".into(),
        };
        let b = SchemaViolation::DuplicateTag { tag: "t".into() };
        errors.push(a.clone());
        errors.push(b.clone());
        errors.push(a.clone());
        assert_eq!(errors.violations, vec![a, b]);
    }

    #[test]
    fn messages_fill_placeholders() {
        let v = SchemaViolation::WrongFieldPropertyCombos {
            tag: "prices".into(),
            field: "qty".into(),
            prop: "lang".into(),
        };
        assert_eq!(
            v.to_string(),
            "Number of values for field 'qty' and attribute 'lang' should be same"
        );
    }

    #[test]
    fn aggregate_message_lists_all() {
        let mut errors = SchemaErrors::default();
        errors.push(SchemaViolation::MissingSheet { title: "a".into() });
        errors.push(SchemaViolation::MissingSheet { title: "b".into() });
        let text = errors.to_string();
        assert!(text.starts_with("Uploaded snapshot has 2 formatting problem(s)"));
        assert!(text.contains("'a'") && text.contains("'b'"));
        assert!(errors.clone().into_result(()).is_err());
        assert!(SchemaErrors::default().into_result(()).is_ok());
    }
}
