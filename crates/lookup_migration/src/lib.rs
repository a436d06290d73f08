//! # Lookup Migration
//!
//! Keeps the legacy document store and the relational store content
//! equivalent while lookup tables move from one to the other.
//!
//! - [`MigrationKind`] describes one entity kind: how a legacy document
//!   projects to a relational record and how the two are compared.
//! - [`DualWriteAdapter`] writes both stores: on every legacy save
//!   (`sync_on_save`), on relational edits (`save_relational`), and for
//!   whole reconciled tables (`apply`).
//! - `bulk_migrate` backfills every legacy document of a kind, repairing
//!   duplicate natural keys; `fixup_from_log` replays a [`DiffLog`].
//!
//! ## Invariants
//!
//! - Repeating any operation against an equivalent pair writes nothing
//! - Writes reach the legacy store first; a failed legacy request leaves the
//!   relational store untouched
//! - A duplicate is only removed automatically when it has no dependents

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod bulk;
mod difflog;
mod error;
mod kind;

pub use adapter::{DualWriteAdapter, TableWrite, WriteStats};
pub use bulk::{Divergence, FixupReport, MigrationReport, MigrationRun};
pub use difflog::{parse_entries, read_entries, DiffLog, LogEntry};
pub use error::{MigrationError, MigrationResult};
pub use kind::MigrationKind;
