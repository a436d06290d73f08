//! Entry point shared by import, export and table edits.

use crate::error::{SyncError, SyncResult};
use lookup_core::PrincipalDirectory;
use lookup_migration::DualWriteAdapter;
use lookup_model::{Table, TableId};
use std::sync::Arc;

/// Lookup table operations for one deployment.
///
/// Cheap to clone; clones share the stores, cache and directory.
#[derive(Clone)]
pub struct LookupService {
    adapter: DualWriteAdapter,
    directory: Arc<dyn PrincipalDirectory>,
}

impl std::fmt::Debug for LookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl LookupService {
    /// Creates a service writing through `adapter` and resolving owner
    /// names with `directory`.
    pub fn new(adapter: DualWriteAdapter, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { adapter, directory }
    }

    /// The dual-write adapter.
    #[must_use]
    pub fn adapter(&self) -> &DualWriteAdapter {
        &self.adapter
    }

    /// The principal directory.
    #[must_use]
    pub fn directory(&self) -> &dyn PrincipalDirectory {
        self.directory.as_ref()
    }

    /// Looks up a table by tag.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TableNotFound`] if the domain has no such table.
    pub fn table(&self, domain: &str, tag: &str) -> SyncResult<Table> {
        self.adapter
            .relational()
            .find_table_by_tag(domain, tag)?
            .ok_or_else(|| SyncError::TableNotFound {
                domain: domain.to_string(),
                table: tag.to_string(),
            })
    }

    /// Looks up a table by id, checking its domain.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TableNotFound`] if the table does not exist in
    /// the domain.
    pub fn table_by_id(&self, domain: &str, id: TableId) -> SyncResult<Table> {
        self.adapter
            .relational()
            .get::<Table>(id)?
            .filter(|t| t.domain == domain)
            .ok_or_else(|| SyncError::TableNotFound {
                domain: domain.to_string(),
                table: id.to_string(),
            })
    }
}
