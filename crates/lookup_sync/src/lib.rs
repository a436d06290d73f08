//! # Lookup Sync
//!
//! User-facing operations on lookup tables, written through the
//! [`lookup_migration::DualWriteAdapter`] so both stores stay equivalent.
//!
//! - [`LookupService::upload`] imports a snapshot: validate everything,
//!   reconcile each table against its rows, apply one dual write per table
//! - [`LookupService::export`] writes tables back out in the same grammar
//! - [`LookupService::create_table`], [`LookupService::update_table`] and
//!   [`LookupService::delete_table`] edit a single table
//! - [`jobs`] runs the long operations on Tokio's blocking pool
//!
//! ## Example
//!
//! ```rust
//! use lookup_core::{ImportConfig, InMemoryDirectory, NoProgress};
//! use lookup_core::schema::{RowDict, Workbook, Worksheet};
//! use lookup_migration::DualWriteAdapter;
//! use lookup_storage::{InMemoryDocumentStore, SqliteStore};
//! use lookup_sync::LookupService;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let adapter = DualWriteAdapter::new(
//!     Arc::new(InMemoryDocumentStore::new()),
//!     Arc::new(SqliteStore::open_in_memory().unwrap()),
//! );
//! let service = LookupService::new(adapter, Arc::new(InMemoryDirectory::new()));
//!
//! let row = |v: serde_json::Value| -> RowDict { serde_json::from_value(v).unwrap() };
//! let workbook = Workbook::new()
//!     .with_sheet(Worksheet::new("types").with_row(row(json!({
//!         "table_id": "states", "is_global": "yes", "field": ["name"],
//!     }))))
//!     .with_sheet(Worksheet::new("states").with_row(row(json!({
//!         "field": {"name": "Ohio"},
//!     }))));
//!
//! let result = service.upload("demo", &workbook, &ImportConfig::new(), &NoProgress).unwrap();
//! assert!(result.success);
//! assert_eq!(result.created, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod download;
mod error;
pub mod jobs;
mod service;
mod tables;
mod upload;

pub use error::{SyncError, SyncResult};
pub use jobs::JobHandle;
pub use service::LookupService;
pub use tables::{FieldPatch, TableEdit};
pub use upload::UploadResult;
