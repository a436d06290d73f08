//! # Lookup Core
//!
//! Store-independent logic shared by import, export and migration.
//!
//! This crate provides:
//! - [`Reconciler`]: computes the creates and deletes that turn persisted
//!   state into a desired snapshot, keeping matched entities in place
//! - [`OwnershipIndex`]: memoized resolution of user, group and location
//!   names to principal ids
//! - [`schema::validate`]: whole-snapshot structural validation that
//!   collects every problem before anything is written
//! - [`TableCache`] and [`ProgressSink`] ports
//! - [`ImportConfig`] and [`MigrationConfig`]
//!
//! ## Invariants
//!
//! - Reconciliation never deletes the same entity twice
//! - An unresolvable owner name yields a warning, never an error
//! - A snapshot with any structural problem causes no mutation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod ownership;
mod progress;
mod reconcile;
pub mod schema;

pub use cache::{MemoizedTableCache, NoopCache, TableCache};
pub use config::{ImportConfig, MigrationConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PROGRESS_INTERVAL};
pub use error::{CoreError, CoreResult};
pub use ownership::{
    owner_changes, InMemoryDirectory, OwnerChanges, OwnerSpec, OwnershipIndex, OwnershipWarning,
    Principal, PrincipalDirectory, Resolution, ResolvedOwners,
};
pub use progress::{NoProgress, Progress, ProgressSink, RateLimitedProgress};
pub use reconcile::{Desired, Identified, IdentityHint, Keyed, Mutation, Reconciler};
pub use schema::{SchemaErrors, SchemaViolation};
