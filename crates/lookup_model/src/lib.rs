//! # Lookup Model
//!
//! Entity model for tenant-scoped lookup tables.
//!
//! This crate provides:
//! - Stable identifiers for tables, rows and row owners
//! - [`Table`] and [`FieldDef`] schema definitions
//! - [`Row`] and [`FieldValue`] records with the API/export wire shape
//! - [`RowOwner`] visibility grants
//! - Legacy document shapes and the one-time upgrade step applied at read time
//!
//! ## Invariants
//!
//! - A table tag is unique within its domain
//! - `Table::fields` order is the canonical column order for import and export
//! - A field without properties carries exactly one value with empty properties
//! - A row owner is unique per `(row_id, owner_type, owner_id)`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
pub mod legacy;
mod owner;
mod row;
mod table;
pub mod wire;

pub use error::{ModelError, ModelResult};
pub use id::{OwnerId, RowId, TableId};
pub use owner::{OwnerType, RowOwner};
pub use row::{FieldValue, Row, RowContent};
pub use table::{is_valid_identifier, FieldDef, Table, MAX_TAG_LEN};

/// Model version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
