//! Long operations run as background jobs.
//!
//! The work itself is synchronous; it runs on the blocking pool and
//! publishes progress on a watch channel. There is no cancellation: a job
//! that dies is simply started again, which is safe because every operation
//! here can be repeated.
//!
//! All `spawn_*` functions must be called from within a Tokio runtime.

use crate::error::{SyncError, SyncResult};
use crate::service::LookupService;
use crate::upload::UploadResult;
use lookup_core::schema::Workbook;
use lookup_core::{ImportConfig, MigrationConfig, Progress, ProgressSink};
use lookup_migration::{MigrationKind, MigrationRun};
use lookup_model::TableId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Publishes progress to a watch channel.
struct WatchProgress(watch::Sender<Progress>);

impl ProgressSink for WatchProgress {
    fn report(&self, progress: Progress) {
        self.0.send_replace(progress);
    }
}

/// A running job.
#[derive(Debug)]
pub struct JobHandle<T> {
    progress: watch::Receiver<Progress>,
    task: JoinHandle<SyncResult<T>>,
}

impl<T: Send + 'static> JobHandle<T> {
    fn spawn(work: impl FnOnce(&dyn ProgressSink) -> SyncResult<T> + Send + 'static) -> Self {
        let (tx, progress) = watch::channel(Progress::default());
        let task = tokio::task::spawn_blocking(move || work(&WatchProgress(tx)));
        Self { progress, task }
    }

    /// The latest reported progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    /// A receiver notified on every progress update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Returns true once the job has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the job's result.
    ///
    /// # Errors
    ///
    /// Returns the job's own error, or [`SyncError::Job`] if it panicked.
    pub async fn join(self) -> SyncResult<T> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "background job stopped");
                Err(SyncError::Job(err.to_string()))
            }
        }
    }
}

impl LookupService {
    /// Runs [`LookupService::upload`] in the background.
    pub fn spawn_upload(
        &self,
        domain: impl Into<String>,
        workbook: Workbook,
        config: ImportConfig,
    ) -> JobHandle<UploadResult> {
        let service = self.clone();
        let domain = domain.into();
        JobHandle::spawn(move |progress| service.upload(&domain, &workbook, &config, progress))
    }

    /// Runs a bulk migration of one kind in the background.
    pub fn spawn_migration<K: MigrationKind + 'static>(&self, config: MigrationConfig) -> JobHandle<MigrationRun> {
        let adapter = self.adapter().clone();
        JobHandle::spawn(move |progress| Ok(adapter.migrate::<K>(&config, progress)?))
    }

    /// Deletes a table in the background.
    pub fn spawn_table_delete(&self, domain: impl Into<String>, id: TableId) -> JobHandle<usize> {
        let service = self.clone();
        let domain = domain.into();
        JobHandle::spawn(move |progress| {
            let deleted = service.delete_table(&domain, id)?;
            progress.report(Progress {
                tables_done: 1,
                total_tables: 1,
                ..Progress::default()
            });
            Ok(deleted)
        })
    }
}
