//! Bulk import of a snapshot into both stores.
//!
//! The whole snapshot is validated before anything is written. Each table is
//! then reconciled against its persisted rows and applied as one dual write;
//! a transport failure on one table is recorded and the next table proceeds.

use crate::error::SyncResult;
use crate::service::LookupService;
use lookup_core::schema::{parse_data_row, validate, DataRow, TableDefinition, Workbook};
use lookup_core::{
    owner_changes, CoreError, Desired, IdentityHint, ImportConfig, Keyed, OwnerSpec, OwnershipIndex,
    Progress, ProgressSink, RateLimitedProgress, Reconciler,
};
use lookup_migration::{DualWriteAdapter, TableWrite};
use lookup_model::{Row, RowContent, RowId, RowOwner, Table, TableId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// True if every table was imported.
    pub success: bool,
    /// Errors in first-seen order. Schema errors mean nothing was written.
    pub errors: Vec<String>,
    /// Non-fatal problems, such as unknown owner names.
    pub warnings: Vec<String>,
    /// Tables processed, including deleted ones.
    pub tables: usize,
    /// Rows created.
    pub created: usize,
    /// Rows deleted.
    pub deleted: usize,
    /// Rows kept in place.
    pub updated: usize,
}

impl UploadResult {
    fn error(&mut self, message: String) {
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    fn warning(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    /// Renders the result as the ordered list of messages shown to users.
    #[must_use]
    pub fn display_messages(&self) -> Vec<String> {
        let mut messages = Vec::with_capacity(self.errors.len() + self.warnings.len() + 1);
        if self.success {
            messages.push(format!(
                "Upload complete: {} tables, {} rows created, {} updated, {} deleted",
                self.tables, self.created, self.updated, self.deleted
            ));
        }
        messages.extend(self.errors.iter().cloned());
        messages.extend(self.warnings.iter().cloned());
        messages
    }
}

/// A desired row built from one data sheet line.
#[derive(Debug, Clone)]
struct RowDraft {
    row: Row,
    hint: Option<RowId>,
    uid: Option<String>,
    owners: OwnerSpec,
}

impl Keyed for RowDraft {
    type Key = RowContent;

    fn content_key(&self) -> RowContent {
        self.row.content_key()
    }
}

impl IdentityHint for RowDraft {
    type Id = RowId;

    fn identity_hint(&self) -> Option<RowId> {
        self.hint
    }
}

fn invalid_uid(uid: &str) -> String {
    format!("'{uid}' is not a valid UID. But the new item is created.")
}

fn desired_rows(table: &Table, data: Vec<DataRow>) -> SyncResult<Vec<Desired<RowDraft, RowId>>> {
    let mut desired = Vec::with_capacity(data.len());
    for (i, data) in data.into_iter().enumerate() {
        let hint = data.uid.as_deref().and_then(|uid| RowId::parse(uid).ok());
        if data.delete {
            desired.extend(hint.map(Desired::Delete));
            continue;
        }
        let sort_key = i64::try_from(i).map_err(|_| {
            CoreError::invalid_operation(format!("table '{}' has too many rows", table.tag))
        })?;
        let mut row = Row::new(&table.domain, table.id).with_sort_key(sort_key);
        row.fields = data.fields;
        row.item_attributes = data.item_attributes;
        desired.push(Desired::Upsert(RowDraft {
            row,
            hint,
            uid: data.uid,
            owners: data.owners,
        }));
    }
    Ok(desired)
}

struct TableRun<'a> {
    adapter: &'a DualWriteAdapter,
    domain: &'a str,
    replace: bool,
}

impl LookupService {
    /// Imports a snapshot into a domain.
    ///
    /// Structural problems are returned in [`UploadResult::errors`] with
    /// nothing written. Owner names that cannot be resolved become warnings;
    /// their rows are still imported.
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails in a way other than a partial bulk
    /// write.
    pub fn upload(
        &self,
        domain: &str,
        workbook: &Workbook,
        config: &ImportConfig,
        progress: &dyn ProgressSink,
    ) -> SyncResult<UploadResult> {
        let mut result = UploadResult::default();
        let snapshot = match validate(workbook, config.replace) {
            Ok(snapshot) => snapshot,
            Err(errors) => {
                info!(domain, violations = errors.len(), "snapshot rejected");
                for message in errors.messages() {
                    result.error(message);
                }
                return Ok(result);
            }
        };

        let adapter = self.adapter().clone().with_chunk_size(config.chunk_size);
        let run = TableRun {
            adapter: &adapter,
            domain,
            replace: config.replace,
        };
        let limited = RateLimitedProgress::new(|p: Progress| progress.report(p), config.progress_interval);
        let mut owners = OwnershipIndex::new(self.directory(), domain);
        let total_tables = snapshot.tables.len();

        for (tables_done, def) in snapshot.tables.iter().enumerate() {
            let rows = workbook.sheet(&def.tag).map_or(&[][..], |s| s.rows.as_slice());
            let data: Vec<DataRow> = rows.iter().map(|r| parse_data_row(def, r)).collect();
            let rows_in_table = data.len();
            let report = |rows_done: usize| {
                limited.report(Progress {
                    tables_done,
                    rows_done,
                    rows_in_table,
                    total_tables,
                });
            };
            report(0);
            if let Err(err) = run.table(def, data, &mut owners, &mut result, &report) {
                if !err.is_transport() {
                    return Err(err);
                }
                warn!(domain, tag = %def.tag, error = %err, "table not imported");
                result.error(format!("Table '{}' could not be saved: {err}", def.tag));
            }
            result.tables += 1;
        }

        result.success = result.errors.is_empty();
        progress.report(Progress {
            tables_done: total_tables,
            rows_done: 0,
            rows_in_table: 0,
            total_tables,
        });
        info!(
            domain,
            tables = result.tables,
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            "snapshot imported"
        );
        Ok(result)
    }
}

impl TableRun<'_> {
    fn resolve_table(&self, def: &TableDefinition, result: &mut UploadResult) -> SyncResult<Option<Table>> {
        let relational = self.adapter.relational();
        if let Some(table) = relational.find_table_by_tag(self.domain, &def.tag)? {
            return Ok(Some(table));
        }
        let Some(uid) = def.uid.as_deref() else {
            return Ok(None);
        };
        let Ok(id) = TableId::parse(uid) else {
            return Ok(None);
        };
        match relational.get::<Table>(id)? {
            Some(table) if table.domain == self.domain => Ok(Some(table)),
            Some(_) => {
                result.warning(format!(
                    "Table '{}' has a UID from another project; a new table was created",
                    def.tag
                ));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Starts the write of a table: its definition when it is new or
    /// changed, and in replace mode the old table it supersedes. Nothing is
    /// saved until the rows are applied with it.
    fn plan_table(&self, def: &TableDefinition, existing: Option<Table>) -> (Table, TableWrite) {
        match existing {
            Some(old) => {
                let table = def.to_table(self.domain, old.id);
                if self.replace && !table.same_definition(&old) {
                    let table = def.to_table(self.domain, TableId::new());
                    info!(domain = self.domain, tag = %table.tag, "recreating table with new definition");
                    let mut write = TableWrite::new(self.domain, table.id);
                    write.replaces = Some(old.id);
                    write.table = Some(table.clone());
                    return (table, write);
                }
                let mut write = TableWrite::new(self.domain, table.id);
                if table != old {
                    write.table = Some(table.clone());
                }
                (table, write)
            }
            None => {
                let table = def.to_table(self.domain, TableId::new());
                let mut write = TableWrite::new(self.domain, table.id);
                write.table = Some(table.clone());
                (table, write)
            }
        }
    }

    fn table(
        &self,
        def: &TableDefinition,
        data: Vec<DataRow>,
        owners: &mut OwnershipIndex<'_>,
        result: &mut UploadResult,
        report: &dyn Fn(usize),
    ) -> SyncResult<()> {
        let existing = self.resolve_table(def, result)?;
        if def.delete {
            if let Some(table) = existing {
                let removed = self.adapter.relational().count_rows(table.id)?;
                self.adapter.delete_table(self.domain, table.id)?;
                result.deleted += removed;
            }
            return Ok(());
        }
        let (table, mut write) = self.plan_table(def, existing);

        let relational = self.adapter.relational();
        let old_rows = relational.rows_for_table(table.id)?;
        let mut current_owners: HashMap<RowId, Vec<RowOwner>> = HashMap::new();
        for owner in relational.owners_for_table(table.id)? {
            current_owners.entry(owner.row_id).or_default().push(owner);
        }

        let mut warnings = Vec::new();
        let desired = desired_rows(&table, data)?;
        // A malformed UID, or one naming another table's row, is not a
        // hint; the row is created fresh.
        let own: HashSet<RowId> = old_rows.iter().map(|r| r.id).collect();
        for item in &desired {
            let Desired::Upsert(draft) = item else {
                continue;
            };
            let Some(uid) = draft.uid.as_deref() else {
                continue;
            };
            let foreign = match draft.hint {
                None => true,
                Some(id) => !own.contains(&id) && relational.get::<Row>(id)?.is_some(),
            };
            if foreign {
                warnings.push(invalid_uid(uid));
            }
        }
        let total = desired.len();
        let items = desired.into_iter().enumerate().map(|(i, item)| {
            if i % 100 == 0 {
                report(i);
            }
            item
        });
        let mutation = Reconciler::new(old_rows)
            .delete_missing(self.replace)
            .run(items, |old: Row, new: RowDraft| {
                let resolved = owners.resolve_spec(&new.owners);
                warnings.extend(resolved.warnings.iter().map(ToString::to_string));
                let current = current_owners.get(&old.id).map_or(&[][..], Vec::as_slice);
                let changes = owner_changes(self.domain, old.id, current, &resolved);
                write.delete_owners.extend(changes.remove.iter().map(|o| o.id));
                write.create_owners.extend(changes.add);
                if old.sort_key != new.row.sort_key {
                    write.update_rows.push(old.with_sort_key(new.row.sort_key));
                }
            });
        report(total);

        for draft in &mutation.to_create {
            let resolved = owners.resolve_spec(&draft.owners);
            warnings.extend(resolved.warnings.iter().map(ToString::to_string));
            write
                .create_owners
                .extend(owner_changes(self.domain, draft.row.id, &[], &resolved).add);
        }
        write.delete_rows = mutation.to_delete.iter().map(|r| r.id).collect();
        write.create_rows = mutation.to_create.into_iter().map(|d| d.row).collect();
        debug!(
            domain = self.domain,
            tag = %table.tag,
            create = write.create_rows.len(),
            delete = write.delete_rows.len(),
            merged = mutation.merged,
            "reconciled table"
        );

        for warning in warnings {
            result.warning(warning);
        }
        let replaced_rows = match write.replaces {
            Some(old) => relational.count_rows(old)?,
            None => 0,
        };
        self.adapter.apply(&write)?;
        result.created += write.create_rows.len();
        result.deleted += write.delete_rows.len() + replaced_rows;
        result.updated += mutation.merged;
        Ok(())
    }
}
