//! Error types for the dual-write adapter.

use lookup_core::CoreError;
use lookup_model::ModelError;
use lookup_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors that can occur while keeping the two stores equivalent.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Several legacy documents claim one natural key and the survivor
    /// cannot be chosen without losing data. Needs an operator.
    #[error("{kind} documents {} share natural key {key} and cannot be merged automatically", ids.join(", "))]
    IdentityAmbiguity {
        /// Entity kind.
        kind: &'static str,
        /// Rendered natural key.
        key: String,
        /// Ids of the conflicting documents.
        ids: Vec<String>,
    },

    /// A diff log path is already taken.
    #[error("log file already exists: {}", path.display())]
    LogExists {
        /// The path.
        path: PathBuf,
    },

    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A document could not be upgraded to the entity model.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading or writing a diff log failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MigrationError {
    /// Returns true if the error is a partial bulk write failure.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Transport { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguity_message_names_every_document() {
        let err = MigrationError::IdentityAmbiguity {
            kind: "table",
            key: "(d, states)".into(),
            ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "table documents a, b share natural key (d, states) and cannot be merged automatically"
        );
    }

    #[test]
    fn transport_is_detected() {
        let err: MigrationError = StorageError::Transport {
            failed: vec!["a".into()],
            message: "rejected".into(),
        }
        .into();
        assert!(err.is_transport());
        assert!(!MigrationError::from(io::Error::other("x")).is_transport());
    }
}
