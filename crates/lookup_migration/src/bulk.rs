//! Bulk migration, conflict repair and diff-log fixup.
//!
//! Every run is re-entrant: records that already match are skipped, records
//! that diverge are patched, and nothing is ever created twice. An
//! interrupted run is simply started again.

use crate::adapter::DualWriteAdapter;
use crate::difflog::{read_entries, DiffLog, LogEntry};
use crate::error::{MigrationError, MigrationResult};
use crate::kind::MigrationKind;
use lookup_core::{MigrationConfig, Progress, ProgressSink, RateLimitedProgress};
use lookup_model::TableId;
use lookup_storage::{check_outcomes, Record};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// A legacy document whose relational record differs from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Legacy document id.
    pub doc_id: String,
    /// Diff lines in column order.
    pub diffs: Vec<String>,
}

/// Outcome of one [`DualWriteAdapter::bulk_migrate`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Entity kind migrated.
    pub kind: &'static str,
    /// Legacy documents read.
    pub scanned: usize,
    /// Relational records created.
    pub created: usize,
    /// Relational records patched to match their document.
    pub updated: usize,
    /// Documents already equivalent.
    pub unchanged: usize,
    /// Documents skipped because their parent is not migrated.
    pub ignored: usize,
    /// Documents that could not be migrated.
    pub failed: usize,
    /// Duplicate documents removed by conflict repair.
    pub duplicates_removed: usize,
    /// Divergences found, before they were patched.
    pub divergences: Vec<Divergence>,
    /// Relational ids without a legacy document.
    pub missing_in_legacy: Vec<String>,
}

impl MigrationReport {
    /// Returns true if the run wrote nothing and found nothing to fix.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.failed == 0
            && self.duplicates_removed == 0
            && self.missing_in_legacy.is_empty()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: scanned {}, created {}, updated {}, unchanged {}, ignored {}, failed {}, duplicates removed {}",
            self.kind,
            self.scanned,
            self.created,
            self.updated,
            self.unchanged,
            self.ignored,
            self.failed,
            self.duplicates_removed,
        )?;
        if !self.missing_in_legacy.is_empty() {
            write!(f, ", missing in legacy {}", self.missing_in_legacy.len())?;
        }
        Ok(())
    }
}

/// Outcome of one [`DualWriteAdapter::fixup_from_log`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixupReport {
    /// Log entries read.
    pub entries: usize,
    /// Records re-synced from their legacy document.
    pub resynced: usize,
    /// Relational records removed because their document is gone.
    pub removed: usize,
    /// Entries that needed nothing.
    pub unchanged: usize,
    /// Entries that could not be fixed.
    pub failed: usize,
    /// Relational records without a document removed because they held a
    /// resynced record's natural key.
    pub orphans_removed: usize,
}

/// What [`DualWriteAdapter::migrate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationRun {
    /// A bulk migration ran.
    Migrated(MigrationReport),
    /// A diff log was replayed.
    FixedUp(FixupReport),
}

impl fmt::Display for MigrationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migrated(report) => report.fmt(f),
            Self::FixedUp(r) => write!(
                f,
                "fixup: {} entries, {} resynced, {} removed, {} unchanged, {} failed, {} orphans removed",
                r.entries, r.resynced, r.removed, r.unchanged, r.failed, r.orphans_removed
            ),
        }
    }
}

struct Candidate<K: MigrationKind> {
    legacy: K::Legacy,
    record: K,
}

impl DualWriteAdapter {
    /// Runs one configured migration of a kind.
    ///
    /// With [`MigrationConfig::fixup_log`] set, the log is replayed instead
    /// of scanning the legacy store. Otherwise a bulk migration runs,
    /// writing divergences to [`MigrationConfig::log_path`] if set.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LogExists`] if the log path is taken, and
    /// any error of the run itself.
    pub fn migrate<K: MigrationKind>(
        &self,
        config: &MigrationConfig,
        progress: &dyn ProgressSink,
    ) -> MigrationResult<MigrationRun> {
        let adapter = self.clone().with_chunk_size(config.chunk_size);
        if let Some(path) = &config.fixup_log {
            return Ok(MigrationRun::FixedUp(adapter.fixup_from_log::<K>(path)?));
        }
        let mut log = match &config.log_path {
            Some(path) => DiffLog::create(path)?,
            None => DiffLog::in_memory(),
        };
        let progress = RateLimitedProgress::new(|p: Progress| progress.report(p), config.progress_interval);
        Ok(MigrationRun::Migrated(adapter.bulk_migrate::<K>(&mut log, &progress)?))
    }

    /// Creates or patches the relational record of every legacy document of
    /// one kind.
    ///
    /// Documents that cannot be parsed or written are logged and counted as
    /// failed without stopping the run. Duplicates sharing a natural key are
    /// repaired first: the lowest id survives.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::IdentityAmbiguity`] if a conflict cannot be
    /// repaired automatically, or an error if a store cannot be read.
    pub fn bulk_migrate<K: MigrationKind>(
        &self,
        log: &mut DiffLog,
        progress: &dyn ProgressSink,
    ) -> MigrationResult<MigrationReport> {
        let docs = self.legacy().iter_doc_type(K::DOC_TYPE)?;
        let mut report = MigrationReport {
            kind: K::KIND,
            scanned: docs.len(),
            ..MigrationReport::default()
        };
        info!(kind = K::KIND, documents = docs.len(), "starting bulk migration");

        let mut candidates = Vec::with_capacity(docs.len());
        let mut legacy_ids = HashSet::with_capacity(docs.len());
        for doc in &docs {
            if let Ok(id) = doc.id().parse::<K::Id>() {
                legacy_ids.insert(id);
            }
            match K::parse(doc).and_then(|legacy| Ok((K::project(&legacy)?, legacy))) {
                Ok((record, legacy)) => candidates.push(Candidate { legacy, record }),
                Err(err) => {
                    warn!(kind = K::KIND, doc_id = doc.id(), error = %err, "cannot migrate document");
                    report.failed += 1;
                }
            }
        }

        report.duplicates_removed = self.repair_conflicts(&mut candidates, log)?;

        let total = candidates.len();
        let mut scopes = BTreeSet::new();
        let mut creates = Vec::new();
        for (done, candidate) in candidates.iter().enumerate() {
            if let Err(err) = self.migrate_one(candidate, log, &mut report, &mut creates, &mut scopes) {
                warn!(
                    kind = K::KIND,
                    doc_id = K::legacy_id(&candidate.legacy),
                    error = %err,
                    "cannot migrate document"
                );
                report.failed += 1;
            }
            if done % self.chunk_size() == 0 {
                progress.report(migration_progress(done, total));
            }
        }

        self.create_chunked(&creates, log, &mut report, &mut scopes)?;

        for id in self.relational().ids::<K>()? {
            if !legacy_ids.contains(&id) {
                let id = id.to_string();
                log.record_missing_in_legacy(&id)?;
                report.missing_in_legacy.push(id);
            }
        }

        log.flush()?;
        self.invalidate(scopes);
        progress.report(migration_progress(total, total));
        info!(kind = K::KIND, %report, "bulk migration finished");
        Ok(report)
    }

    fn migrate_one<K: MigrationKind>(
        &self,
        candidate: &Candidate<K>,
        log: &mut DiffLog,
        report: &mut MigrationReport,
        creates: &mut Vec<K>,
        scopes: &mut BTreeSet<(String, TableId)>,
    ) -> MigrationResult<()> {
        let Candidate { legacy, record } = candidate;
        let doc_id = K::legacy_id(legacy);
        match self.relational().get::<K>(record.record_id())? {
            None if !record.has_parent(self.relational())? => {
                debug!(kind = K::KIND, doc_id, "parent not migrated, ignoring document");
                log.record_action(format!("Ignored {} {doc_id}: parent not migrated", K::KIND))?;
                report.ignored += 1;
            }
            None => creates.push(record.clone()),
            Some(existing) => {
                let diffs = K::diff(legacy, &existing);
                if diffs.is_empty() {
                    report.unchanged += 1;
                    return Ok(());
                }
                log.record_diff(doc_id, &diffs)?;
                report.divergences.push(Divergence {
                    doc_id: doc_id.to_string(),
                    diffs,
                });
                if self.relational().save(record)?.wrote() {
                    log.record_action(format!("Updated {} {doc_id}", K::KIND))?;
                    scopes.extend(record.cache_scope(self.relational())?);
                    report.updated += 1;
                }
            }
        }
        Ok(())
    }

    fn create_chunked<K: MigrationKind>(
        &self,
        creates: &[K],
        log: &mut DiffLog,
        report: &mut MigrationReport,
        scopes: &mut BTreeSet<(String, TableId)>,
    ) -> MigrationResult<()> {
        for chunk in creates.chunks(self.chunk_size()) {
            let mut failed = Vec::new();
            let written: Vec<&K> = match self.relational().apply_chunked(chunk, &[], chunk.len()) {
                Ok(_) => chunk.iter().collect(),
                Err(err) => {
                    debug!(kind = K::KIND, error = %err, "chunk failed, inserting one by one");
                    chunk
                        .iter()
                        .filter(|record| match self.relational().insert(*record) {
                            Ok(()) => true,
                            Err(err) => {
                                warn!(kind = K::KIND, id = %record.record_id(), error = %err, "cannot create record");
                                report.failed += 1;
                                failed.push(record.record_id().to_string());
                                false
                            }
                        })
                        .collect()
                }
            };
            for record in written {
                log.record_action(format!("Created {} {}", K::KIND, record.record_id()))?;
                scopes.extend(record.cache_scope(self.relational())?);
                report.created += 1;
            }
            // A fixup run retries these, clearing whatever blocked them.
            for id in &failed {
                let line = format!("id: legacy value \"{id}\" != relational value null");
                log.record_diff(id, &[line])?;
            }
        }
        Ok(())
    }

    /// Removes legacy documents that duplicate another's natural key.
    ///
    /// In each group the document with the lowest id survives, since it is
    /// the one offline clients most likely hold. The others are deleted from
    /// the legacy store in one request, and any relational records they own
    /// are deleted too. Returns the number of documents removed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::IdentityAmbiguity`] before deleting anything
    /// if a document that would be removed has dependents of its own.
    fn repair_conflicts<K: MigrationKind>(
        &self,
        candidates: &mut Vec<Candidate<K>>,
        log: &mut DiffLog,
    ) -> MigrationResult<usize> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if let Some(key) = candidate.record.natural_key() {
                groups.entry(key).or_default().push(idx);
            }
        }

        let mut losers = BTreeSet::new();
        for (key, mut members) in groups {
            if members.len() < 2 {
                continue;
            }
            members.sort_by_key(|&idx| candidates[idx].record.record_id());
            for &idx in &members[1..] {
                if K::dependents(&candidates[idx].legacy, self.legacy())? > 0 {
                    return Err(MigrationError::IdentityAmbiguity {
                        kind: K::KIND,
                        key,
                        ids: members
                            .iter()
                            .map(|&i| K::legacy_id(&candidates[i].legacy).to_string())
                            .collect(),
                    });
                }
            }
            let survivor = K::legacy_id(&candidates[members[0]].legacy);
            for &idx in &members[1..] {
                info!(
                    kind = K::KIND,
                    key = %key,
                    survivor,
                    doc_id = K::legacy_id(&candidates[idx].legacy),
                    "removing duplicate document"
                );
                losers.insert(idx);
            }
        }
        if losers.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = losers
            .iter()
            .map(|&idx| K::legacy_id(&candidates[idx].legacy).to_string())
            .collect();
        check_outcomes(&self.legacy().bulk_delete(&ids)?)?;
        for &idx in &losers {
            self.relational().delete::<K>(candidates[idx].record.record_id())?;
        }
        for id in &ids {
            log.record_action(format!("Removed duplicate {} {id}", K::KIND))?;
        }

        let mut idx = 0;
        candidates.retain(|_| {
            let keep = !losers.contains(&idx);
            idx += 1;
            keep
        });
        Ok(ids.len())
    }

    /// Re-syncs every entry of a diff log written by an earlier run.
    ///
    /// Divergent documents are projected again and saved. Relational records
    /// whose legacy document no longer exists are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn fixup_from_log<K: MigrationKind>(&self, path: &Path) -> MigrationResult<FixupReport> {
        let entries = read_entries(path)?;
        let mut report = FixupReport {
            entries: entries.len(),
            ..FixupReport::default()
        };
        let mut scopes = BTreeSet::new();
        for entry in &entries {
            match self.fixup_one::<K>(entry, &mut scopes) {
                Ok(Fixup::Resynced { orphans }) => {
                    report.resynced += 1;
                    report.orphans_removed += orphans;
                }
                Ok(Fixup::Removed) => report.removed += 1,
                Ok(Fixup::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    warn!(kind = K::KIND, doc_id = entry.id(), error = %err, "cannot fix up document");
                    report.failed += 1;
                }
            }
        }
        self.invalidate(scopes);
        info!(
            kind = K::KIND,
            resynced = report.resynced,
            removed = report.removed,
            orphans_removed = report.orphans_removed,
            failed = report.failed,
            "fixup finished"
        );
        Ok(report)
    }

    fn fixup_one<K: MigrationKind>(
        &self,
        entry: &LogEntry,
        scopes: &mut BTreeSet<(String, TableId)>,
    ) -> MigrationResult<Fixup> {
        let Some(doc) = self.legacy().get(entry.id())? else {
            let id: K::Id = entry.id().parse()?;
            let Some(record) = self.relational().get::<K>(id)? else {
                return Ok(Fixup::Unchanged);
            };
            scopes.extend(record.cache_scope(self.relational())?);
            self.relational().delete::<K>(id)?;
            return Ok(Fixup::Removed);
        };
        let legacy = K::parse(&doc)?;
        let record = K::project(&legacy)?;
        if let Some(existing) = self.relational().get::<K>(record.record_id())? {
            if K::diff(&legacy, &existing).is_empty() {
                return Ok(Fixup::Unchanged);
            }
        }
        let orphans = self.remove_orphaned_twins(&record, scopes)?;
        self.relational().save(&record)?;
        scopes.extend(record.cache_scope(self.relational())?);
        Ok(Fixup::Resynced { orphans })
    }

    /// Deletes relational records that hold `record`'s natural key under
    /// another id and have no legacy document. A twin whose document still
    /// exists is kept. Returns the number removed.
    fn remove_orphaned_twins<K: MigrationKind>(
        &self,
        record: &K,
        scopes: &mut BTreeSet<(String, TableId)>,
    ) -> MigrationResult<usize> {
        let mut removed = 0;
        for twin in record.twins(self.relational())? {
            let id = twin.record_id().to_string();
            if self.legacy().get(&id)?.is_some() {
                continue;
            }
            info!(
                kind = K::KIND,
                orphan = %id,
                doc_id = %record.record_id(),
                "removing orphaned relational record"
            );
            scopes.extend(twin.cache_scope(self.relational())?);
            self.relational().delete::<K>(twin.record_id())?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Counts legacy documents of one kind that still lack a relational
    /// record. Documents whose parent is not migrated are not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be read.
    pub fn pending_count<K: MigrationKind>(&self) -> MigrationResult<usize> {
        let mut pending = 0;
        for doc in self.legacy().iter_doc_type(K::DOC_TYPE)? {
            let Ok(record) = K::parse(&doc).and_then(|legacy| K::project(&legacy)) else {
                continue;
            };
            if self.relational().get::<K>(record.record_id())?.is_none()
                && record.has_parent(self.relational())?
            {
                pending += 1;
            }
        }
        Ok(pending)
    }
}

enum Fixup {
    Resynced { orphans: usize },
    Removed,
    Unchanged,
}

fn migration_progress(done: usize, total: usize) -> Progress {
    Progress {
        tables_done: 0,
        rows_done: done,
        rows_in_table: total,
        total_tables: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookup_model::legacy::{LegacyTableDoc, TABLE_DOC_TYPE};
    use lookup_model::{FieldDef, Row, Table};
    use lookup_core::NoProgress;
    use lookup_storage::{Document, DocumentStore, InMemoryDocumentStore, SqliteStore};
    use std::sync::Arc;

    fn adapter(docs: Vec<Document>) -> (Arc<InMemoryDocumentStore>, DualWriteAdapter) {
        let legacy = Arc::new(InMemoryDocumentStore::with_documents(docs));
        let adapter = DualWriteAdapter::new(
            legacy.clone(),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
        );
        (legacy, adapter)
    }

    fn table_doc(table: &Table) -> Document {
        Document::from_value(LegacyTableDoc::from_table(table).to_value()).unwrap()
    }

    #[test]
    fn report_display() {
        let report = MigrationReport {
            kind: "table",
            scanned: 3,
            created: 2,
            unchanged: 1,
            ..MigrationReport::default()
        };
        assert_eq!(
            report.to_string(),
            "table: scanned 3, created 2, updated 0, unchanged 1, ignored 0, failed 0, duplicates removed 0"
        );
    }

    #[test]
    fn lowest_id_survives_a_duplicate_tag() {
        let mut tables = vec![Table::new("d", "states"), Table::new("d", "states")];
        tables.sort_by_key(|t| t.id);
        let (legacy, adapter) = adapter(tables.iter().map(table_doc).collect());

        let mut log = DiffLog::in_memory();
        let report = adapter.bulk_migrate::<Table>(&mut log, &NoProgress).unwrap();
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.created, 1);
        assert!(legacy.get(&tables[1].id.to_legacy()).unwrap().is_none());
        assert_eq!(
            adapter.relational().all::<Table>().unwrap()[0].id,
            tables[0].id
        );
    }

    #[test]
    fn duplicate_with_rows_is_ambiguous() {
        let mut tables = vec![Table::new("d", "states"), Table::new("d", "states")];
        tables.sort_by_key(|t| t.id);
        let row = Row::new("d", tables[1].id).with_value("name", "Ohio");
        let mut docs: Vec<Document> = tables.iter().map(table_doc).collect();
        docs.push(row.to_document().unwrap());
        let (legacy, adapter) = adapter(docs);

        let err = adapter
            .bulk_migrate::<Table>(&mut DiffLog::in_memory(), &NoProgress)
            .unwrap_err();
        assert!(matches!(err, MigrationError::IdentityAmbiguity { kind: "table", .. }));
        assert_eq!(legacy.count_doc_type(TABLE_DOC_TYPE).unwrap(), 2);
        assert_eq!(adapter.relational().count::<Table>().unwrap(), 0);
    }

    #[test]
    fn orphaned_rows_are_ignored_not_pending() {
        let table = Table::new("d", "states").with_field(FieldDef::new("name"));
        let row = Row::new("d", table.id).with_value("name", "Ohio");
        let (_, adapter) = adapter(vec![row.to_document().unwrap()]);

        let report = adapter
            .bulk_migrate::<Row>(&mut DiffLog::in_memory(), &NoProgress)
            .unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(report.created, 0);
        assert_eq!(adapter.pending_count::<Row>().unwrap(), 0);
    }
}
