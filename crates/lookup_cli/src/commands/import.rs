//! Import command implementation.

use super::{log_progress, Stores};
use lookup_core::schema::Workbook;
use lookup_core::ImportConfig;
use std::fs;
use std::path::Path;
use tracing::info;

/// Imports a JSON snapshot into a domain.
pub fn run(
    stores: &Stores,
    snapshot: &Path,
    domain: &str,
    replace: bool,
    chunk_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing {:?} into {}", snapshot, domain);

    let workbook: Workbook = serde_json::from_str(&fs::read_to_string(snapshot)?)?;
    let config = ImportConfig::new().replace(replace).chunk_size(chunk_size);
    let result = stores
        .service()
        .upload(domain, &workbook, &config, &log_progress)?;
    stores.persist()?;

    for message in result.display_messages() {
        println!("{message}");
    }
    if result.success {
        Ok(())
    } else {
        Err("Import failed".into())
    }
}
