//! Migrate command implementation.

use super::{log_progress, Stores};
use crate::Kind;
use lookup_core::MigrationConfig;
use lookup_migration::MigrationRun;
use lookup_model::{Row, RowOwner, Table};
use std::path::PathBuf;
use tracing::info;

/// Backfills one entity kind, or replays a diff log.
pub fn run(
    stores: &Stores,
    kind: Kind,
    chunk_size: usize,
    log_path: Option<PathBuf>,
    fixup_diffs: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = MigrationConfig::new().chunk_size(chunk_size);
    if let Some(path) = log_path {
        config = config.log_path(path);
    }
    if let Some(path) = fixup_diffs {
        config = config.fixup_log(path);
    }
    info!("Migrating {:?}", kind);

    let adapter = stores.adapter();
    let run = match kind {
        Kind::Tables => adapter.migrate::<Table>(&config, &log_progress)?,
        Kind::Rows => adapter.migrate::<Row>(&config, &log_progress)?,
        Kind::Owners => adapter.migrate::<RowOwner>(&config, &log_progress)?,
    };
    stores.persist()?;

    println!("{run}");
    if let MigrationRun::Migrated(report) = &run {
        for divergence in &report.divergences {
            println!("  {} differed:", divergence.doc_id);
            for line in &divergence.diffs {
                println!("    {line}");
            }
        }
        if let Some(path) = &config.log_path {
            println!("Diff log written to {}", path.display());
        }
    }
    Ok(())
}
