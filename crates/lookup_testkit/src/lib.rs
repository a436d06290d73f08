//! # Lookup Testkit
//!
//! Test utilities for the lookup table crates.
//!
//! This crate provides:
//! - Store fixtures wiring both stores, a counting cache and a principal
//!   directory into a [`lookup_sync::LookupService`]
//! - Property-based generators for tables, rows and snapshots
//! - Scenario builders for legacy dumps and import snapshots
//!
//! ## Usage
//!
//! ```rust
//! use lookup_testkit::prelude::*;
//!
//! with_test_stores(|stores| {
//!     let docs = scenarios::legacy_dump("demo", 1, 3);
//!     stores.load_legacy(docs);
//!     assert_eq!(stores.adapter().pending_count::<lookup_model::Table>().unwrap(), 1);
//!     assert_eq!(stores.migrate_all()[1].created, 3);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
