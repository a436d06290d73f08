//! Lookup CLI
//!
//! Command-line tools for moving lookup tables between the legacy document
//! store and the relational store.
//!
//! # Commands
//!
//! - `import` - Import a JSON snapshot into a domain
//! - `export` - Export tables of a domain as a JSON snapshot
//! - `migrate` - Backfill one entity kind from the legacy store
//! - `status` - Show record counts and pending migrations

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use lookup_core::DEFAULT_CHUNK_SIZE;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lookup table import, export and migration tools.
#[derive(Parser)]
#[command(name = "lookup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the relational SQLite database
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// Path to the legacy store's JSON document dump
    #[arg(global = true, long)]
    legacy: Option<PathBuf>,

    /// Path to a JSON principal directory used to resolve owner names
    #[arg(global = true, long)]
    principals: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Entity kind to migrate.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Kind {
    /// Table definitions
    Tables,
    /// Table rows
    Rows,
    /// Row ownership records
    Owners,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSON snapshot into a domain
    Import {
        /// Snapshot file
        snapshot: PathBuf,

        /// Target domain
        #[arg(short, long)]
        domain: String,

        /// Delete rows the snapshot does not mention
        #[arg(short, long)]
        replace: bool,

        /// Relational records written per transaction
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Export tables of a domain as a JSON snapshot
    Export {
        /// Source domain
        #[arg(short, long)]
        domain: String,

        /// Table tag to export (repeatable; all tables if omitted)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Backfill one entity kind from the legacy store
    Migrate {
        /// Entity kind
        #[arg(value_enum)]
        kind: Kind,

        /// Relational records written per transaction
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Write the diff log to this file; it must not exist yet
        #[arg(long)]
        log_path: Option<PathBuf>,

        /// Re-sync only the documents listed in this diff log
        #[arg(long)]
        fixup_diffs: Option<PathBuf>,
    },

    /// Show record counts and pending migrations
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("Lookup CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Lookup Model v{}", lookup_model::VERSION);
        return Ok(());
    }

    let db = cli.db.ok_or("--db is required")?;
    let legacy = cli.legacy.ok_or("--legacy is required")?;
    let stores = commands::Stores::open(&db, &legacy, cli.principals.as_deref())?;

    match cli.command {
        Commands::Import {
            snapshot,
            domain,
            replace,
            chunk_size,
        } => commands::import::run(&stores, &snapshot, &domain, replace, chunk_size)?,
        Commands::Export {
            domain,
            tables,
            out,
        } => commands::export::run(&stores, &domain, &tables, out.as_deref())?,
        Commands::Migrate {
            kind,
            chunk_size,
            log_path,
            fixup_diffs,
        } => commands::migrate::run(&stores, kind, chunk_size, log_path, fixup_diffs)?,
        Commands::Status { format } => commands::status::run(&stores, &format)?,
        Commands::Version => {}
    }

    Ok(())
}
