//! Export command implementation.

use super::Stores;
use std::fs;
use std::path::Path;
use tracing::info;

/// Exports tables of a domain as a JSON snapshot.
pub fn run(
    stores: &Stores,
    domain: &str,
    tables: &[String],
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let workbook = stores.service().export(domain, tables)?;
    let text = serde_json::to_string_pretty(&workbook)?;
    match out {
        Some(path) => {
            fs::write(path, text)?;
            info!("Exported {} sheets to {:?}", workbook.sheets.len(), path);
        }
        None => println!("{text}"),
    }
    Ok(())
}
