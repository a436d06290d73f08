//! Error types for import, export and table edits.

use lookup_core::CoreError;
use lookup_migration::MigrationError;
use lookup_model::ModelError;
use lookup_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while importing, exporting or editing tables.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A table with this tag already exists in the domain.
    #[error("a lookup table with tag '{tag}' already exists in domain '{domain}'")]
    DuplicateTag {
        /// Domain.
        domain: String,
        /// Tag.
        tag: String,
    },

    /// No table matches the request.
    #[error("lookup table '{table}' not found in domain '{domain}'")]
    TableNotFound {
        /// Domain.
        domain: String,
        /// Tag or id as requested.
        table: String,
    },

    /// A field patch names a field the table does not have, or clashes
    /// with one it does.
    #[error("invalid field change for '{field}': {reason}")]
    InvalidFieldPatch {
        /// Field name.
        field: String,
        /// What is wrong.
        reason: String,
    },

    /// A background job stopped without a result.
    #[error("job failed: {0}")]
    Job(String),

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A dual write failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A model value is invalid.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl SyncError {
    /// Creates an invalid field patch error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFieldPatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a partial bulk write failure.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Migration(err) => err.is_transport(),
            Self::Storage(StorageError::Transport { .. }) => true,
            _ => false,
        }
    }
}
