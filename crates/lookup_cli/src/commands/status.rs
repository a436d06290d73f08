//! Status command implementation.

use super::Stores;
use lookup_migration::MigrationKind;
use lookup_model::{Row, RowOwner, Table};
use lookup_storage::DocumentStore;
use serde::Serialize;

/// Counts for one entity kind.
#[derive(Debug, Serialize)]
pub struct KindStatus {
    /// Entity kind.
    pub kind: &'static str,
    /// Documents in the legacy store.
    pub legacy: usize,
    /// Records in the relational store.
    pub relational: usize,
    /// Legacy documents without a relational record.
    pub pending: usize,
}

/// Store status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Domains with at least one relational table.
    pub domains: Vec<String>,
    /// Counts per kind.
    pub kinds: Vec<KindStatus>,
}

fn kind_status<K: MigrationKind>(stores: &Stores) -> Result<KindStatus, Box<dyn std::error::Error>> {
    let adapter = stores.adapter();
    Ok(KindStatus {
        kind: K::KIND,
        legacy: adapter.legacy().count_doc_type(K::DOC_TYPE)?,
        relational: adapter.relational().count::<K>()?,
        pending: adapter.pending_count::<K>()?,
    })
}

/// Shows record counts and pending migrations.
pub fn run(stores: &Stores, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = StatusResult {
        domains: stores.adapter().relational().domains()?,
        kinds: vec![
            kind_status::<Table>(stores)?,
            kind_status::<Row>(stores)?,
            kind_status::<RowOwner>(stores)?,
        ],
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("Lookup Store Status");
    println!("===================");
    println!("  Domains: {}", result.domains.len());
    for domain in &result.domains {
        println!("    {domain}");
    }
    println!();
    println!("  {:<12} {:>10} {:>10} {:>10}", "Kind", "Legacy", "Relational", "Pending");
    for kind in &result.kinds {
        println!(
            "  {:<12} {:>10} {:>10} {:>10}",
            kind.kind, kind.legacy, kind.relational, kind.pending
        );
    }
}
