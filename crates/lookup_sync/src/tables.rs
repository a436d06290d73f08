//! Direct edits of one table: create, patch fields, delete.

use crate::error::{SyncError, SyncResult};
use crate::service::LookupService;
use lookup_migration::TableWrite;
use lookup_model::wire::FieldMap;
use lookup_model::{is_valid_identifier, FieldDef, Table, TableId};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;

/// Change to one field of a table.
///
/// Deserializes from the shapes table editors send: `{}` keeps the field,
/// `{"update": "new_name"}` renames it, `{"remove": true}` drops it and
/// `{"is_new": true}` adds it. A rename wins over a removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldPatch {
    /// New name of the field.
    #[serde(default)]
    pub update: Option<String>,
    /// Whether the field is dropped.
    #[serde(default)]
    pub remove: bool,
    /// Whether the field is added.
    #[serde(default)]
    pub is_new: bool,
}

impl FieldPatch {
    /// Keeps a field as is.
    #[must_use]
    pub fn keep() -> Self {
        Self::default()
    }

    /// Renames a field.
    #[must_use]
    pub fn rename(to: impl Into<String>) -> Self {
        Self {
            update: Some(to.into()),
            ..Self::default()
        }
    }

    /// Drops a field and its values.
    #[must_use]
    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Self::default()
        }
    }

    /// Adds a field with no values.
    #[must_use]
    pub fn add() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }
}

/// Requested state of a table's header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableEdit {
    /// Tag.
    pub tag: String,
    /// Global flag.
    pub is_global: bool,
    /// Description.
    pub description: String,
    /// Field patches keyed by current field name, in request order.
    pub fields: Vec<(String, FieldPatch)>,
}

impl TableEdit {
    /// Creates an edit with no field patches.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Sets the global flag.
    #[must_use]
    pub const fn global(mut self, is_global: bool) -> Self {
        self.is_global = is_global;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a field patch.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, patch: FieldPatch) -> Self {
        self.fields.push((name.into(), patch));
        self
    }

    fn patch(&self, name: &str) -> Option<&FieldPatch> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

enum Step<'a> {
    Keep,
    Rename(&'a str),
    Remove,
}

fn step(patch: Option<&FieldPatch>) -> Step<'_> {
    match patch {
        Some(FieldPatch {
            update: Some(to), ..
        }) => Step::Rename(to),
        Some(FieldPatch { remove: true, .. }) => Step::Remove,
        _ => Step::Keep,
    }
}

/// Applies field patches to a definition.
fn patch_fields(current: &[FieldDef], edit: &TableEdit) -> SyncResult<Vec<FieldDef>> {
    for (name, patch) in &edit.fields {
        let exists = current.iter().any(|f| &f.name == name);
        if patch.is_new && exists {
            return Err(SyncError::invalid_field(name, "field already exists"));
        }
        if !patch.is_new && !exists {
            return Err(SyncError::invalid_field(name, "no such field"));
        }
        if let Some(to) = &patch.update {
            if !is_valid_identifier(to) {
                return Err(SyncError::invalid_field(to, "not a valid field name"));
            }
        } else if !patch.remove && !is_valid_identifier(name) {
            return Err(SyncError::invalid_field(name, "not a valid field name"));
        }
    }

    let mut fields = Vec::with_capacity(current.len());
    for field in current {
        match step(edit.patch(&field.name)) {
            Step::Keep => fields.push(field.clone()),
            Step::Rename(to) => fields.push(FieldDef {
                name: to.to_string(),
                ..field.clone()
            }),
            Step::Remove => {}
        }
    }
    fields.extend(
        edit.fields
            .iter()
            .filter(|(_, p)| p.is_new)
            .map(|(name, _)| FieldDef::new(name)),
    );

    let mut seen = HashSet::new();
    if let Some(clash) = fields.iter().find(|f| !seen.insert(f.name.as_str())) {
        return Err(SyncError::invalid_field(&clash.name, "field name used twice"));
    }
    Ok(fields)
}

/// Applies field patches to the field map of one row.
fn patch_row_fields(fields: FieldMap, edit: &TableEdit) -> FieldMap {
    let mut patched = FieldMap::new();
    for (name, values) in fields {
        match step(edit.patch(&name)) {
            Step::Keep => {
                patched.insert(name, values);
            }
            Step::Rename(to) => {
                patched.insert(to.to_string(), values);
            }
            Step::Remove => {}
        }
    }
    for (name, _) in edit.fields.iter().filter(|(_, p)| p.is_new) {
        patched.entry(name.clone()).or_default();
    }
    patched
}

impl LookupService {
    fn check_tag(&self, domain: &str, tag: &str, current: Option<TableId>) -> SyncResult<()> {
        Table::validate_tag(tag)?;
        match self.adapter().relational().find_table_by_tag(domain, tag)? {
            Some(other) if Some(other.id) != current => Err(SyncError::DuplicateTag {
                domain: domain.to_string(),
                tag: tag.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Creates a table whose fields are the names patched in `edit`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateTag`] if the tag is taken, or a model
    /// error if the tag or a field name is invalid.
    pub fn create_table(&self, domain: &str, edit: &TableEdit) -> SyncResult<Table> {
        self.check_tag(domain, &edit.tag, None)?;
        let mut table = Table::new(domain, &edit.tag)
            .global(edit.is_global)
            .with_description(&edit.description);
        for (name, _) in &edit.fields {
            if !is_valid_identifier(name) {
                return Err(SyncError::invalid_field(name, "not a valid field name"));
            }
            if table.field(name).is_some() {
                return Err(SyncError::invalid_field(name, "field name used twice"));
            }
            table = table.with_field(FieldDef::new(name));
        }
        self.adapter().save_relational(&table)?;
        info!(domain, tag = %table.tag, table_id = %table.id, "created table");
        Ok(table)
    }

    /// Updates a table's header and renames, removes or adds fields in the
    /// definition and in every row, as one dual write.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TableNotFound`] if the table is not in the
    /// domain, [`SyncError::DuplicateTag`] if the new tag is taken, or
    /// [`SyncError::InvalidFieldPatch`] if a patch does not fit the table.
    pub fn update_table(&self, domain: &str, id: TableId, edit: &TableEdit) -> SyncResult<Table> {
        let old = self.table_by_id(domain, id)?;
        self.check_tag(domain, &edit.tag, Some(id))?;
        let table = Table {
            tag: edit.tag.clone(),
            is_global: edit.is_global,
            description: edit.description.clone(),
            fields: patch_fields(&old.fields, edit)?,
            ..old.clone()
        };

        let mut write = TableWrite::new(domain, id);
        if table != old {
            write.table = Some(table.clone());
        }
        let touches_rows = edit
            .fields
            .iter()
            .any(|(_, p)| p.is_new || p.remove || p.update.is_some());
        if touches_rows {
            for mut row in self.adapter().relational().rows_for_table(id)? {
                let fields = std::mem::take(&mut row.fields);
                row.fields = patch_row_fields(fields, edit);
                write.update_rows.push(row);
            }
        }
        let stats = self.adapter().apply(&write)?;
        info!(
            domain,
            tag = %table.tag,
            table_id = %id,
            rows = stats.rows_updated,
            "updated table"
        );
        Ok(table)
    }

    /// Deletes a table with its rows and owners.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TableNotFound`] if the table is not in the
    /// domain.
    pub fn delete_table(&self, domain: &str, id: TableId) -> SyncResult<usize> {
        let table = self.table_by_id(domain, id)?;
        let rows = self.adapter().relational().count_rows(table.id)?;
        self.adapter().delete_table(domain, table.id)?;
        Ok(rows)
    }
}
