//! Whole-snapshot validation.

use super::data::check_data_row;
use super::definition::TableDefinition;
use super::snapshot::{Workbook, TYPES_SHEET};
use super::violation::{SchemaErrors, SchemaViolation};
use std::collections::HashSet;
use tracing::debug;

/// A snapshot whose structure was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSnapshot {
    /// Table definitions in types sheet order.
    pub tables: Vec<TableDefinition>,
}

impl ValidatedSnapshot {
    /// Returns the definition with the given tag.
    #[must_use]
    pub fn table(&self, tag: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.tag == tag)
    }
}

/// Checks the structure of a snapshot before anything is written.
///
/// Every problem is collected; validation does not stop at the first one.
/// Data sheets of tables marked for deletion are not required.
///
/// # Errors
///
/// Returns all violations found if there is at least one.
pub fn validate(workbook: &Workbook, replace: bool) -> Result<ValidatedSnapshot, SchemaErrors> {
    let mut errors = SchemaErrors::default();
    let Some(types) = workbook.types() else {
        errors.push(SchemaViolation::MissingSheet {
            title: TYPES_SHEET.to_string(),
        });
        return Err(errors);
    };

    let mut seen = HashSet::new();
    let mut tables = Vec::with_capacity(types.rows.len());
    for row in &types.rows {
        let Some(def) = TableDefinition::from_row(row, &mut errors) else {
            continue;
        };
        if !seen.insert(def.tag.clone()) {
            errors.push(SchemaViolation::DuplicateTag { tag: def.tag.clone() });
            continue;
        }
        tables.push(def);
    }

    for def in tables.iter().filter(|d| !d.delete) {
        match workbook.sheet(&def.tag) {
            None => errors.push(SchemaViolation::MissingSheet {
                title: def.tag.clone(),
            }),
            Some(sheet) => {
                for row in &sheet.rows {
                    check_data_row(def, row, replace, &mut errors);
                }
            }
        }
    }

    debug!(tables = tables.len(), violations = errors.len(), "Snapshot validated");
    errors.into_result(ValidatedSnapshot { tables })
}
