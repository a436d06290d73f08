//! CLI command implementations.

pub mod export;
pub mod import;
pub mod migrate;
pub mod status;

use lookup_core::{InMemoryDirectory, Progress};
use lookup_migration::DualWriteAdapter;
use lookup_storage::{InMemoryDocumentStore, SqliteStore};
use lookup_sync::LookupService;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The two stores a command works on.
///
/// The legacy store is a JSON document dump held in memory; commands that
/// write call [`Stores::persist`] to put it back on disk.
pub struct Stores {
    legacy: Arc<InMemoryDocumentStore>,
    legacy_path: PathBuf,
    service: LookupService,
}

impl Stores {
    /// Opens the relational database and loads the legacy dump.
    ///
    /// A missing dump is an empty legacy store.
    pub fn open(
        db: &Path,
        legacy_path: &Path,
        principals: Option<&Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let legacy = Arc::new(InMemoryDocumentStore::load_json(legacy_path)?);
        let relational = Arc::new(SqliteStore::open(db)?);
        let directory = match principals {
            Some(path) => InMemoryDirectory::from_json(&fs::read_to_string(path)?)?,
            None => InMemoryDirectory::new(),
        };
        info!(
            db = %db.display(),
            legacy = %legacy_path.display(),
            documents = legacy.len(),
            "opened stores"
        );
        let adapter = DualWriteAdapter::new(legacy.clone(), relational);
        Ok(Self {
            legacy,
            legacy_path: legacy_path.to_path_buf(),
            service: LookupService::new(adapter, Arc::new(directory)),
        })
    }

    /// The lookup service over both stores.
    pub fn service(&self) -> &LookupService {
        &self.service
    }

    /// The dual-write adapter.
    pub fn adapter(&self) -> &DualWriteAdapter {
        self.service.adapter()
    }

    /// Writes the legacy store back to its dump.
    pub fn persist(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.legacy.save_json(&self.legacy_path)?;
        debug!(path = %self.legacy_path.display(), documents = self.legacy.len(), "saved legacy dump");
        Ok(())
    }
}

/// Logs progress as a percentage.
pub fn log_progress(progress: Progress) {
    info!(percent = progress.percent(), "progress");
}
