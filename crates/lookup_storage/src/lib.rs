//! # Lookup Storage
//!
//! The two physical stores kept equivalent during the migration window.
//!
//! - [`DocumentStore`]: the legacy, schemaless document store. Documents are
//!   JSON objects with an `_id` and a `doc_type`. [`InMemoryDocumentStore`]
//!   implements it for tests and for JSON dumps.
//! - [`SqliteStore`]: the relational store with one SQL table per entity
//!   kind, foreign keys with cascading deletes, and secondary indexes on
//!   `(domain, tag)` and `(domain, table_id)`.
//!
//! Neither store interprets lookup semantics; that lives in `lookup_core`
//! and `lookup_migration`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod memory;
mod record;
mod sqlite;

pub use document::{check_outcomes, BulkOutcome, Document, DocumentStore};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryDocumentStore;
pub use record::{changed_columns, Record};
pub use sqlite::{ChunkStats, SaveOutcome, SqliteStore};
