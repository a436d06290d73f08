//! Error types for storage operations.

use lookup_model::ModelError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The relational store reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored value could not be upgraded to the entity model.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A document is missing `_id` or `doc_type`.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Record id.
        id: String,
    },

    /// Part of a bulk request failed against one backend.
    #[error("bulk write failed for {} document(s): {message}", failed.len())]
    Transport {
        /// Ids of the documents that were not written.
        failed: Vec<String>,
        /// First failure message.
        message: String,
    },
}

impl StorageError {
    /// Creates a not found error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_counts_failures() {
        let err = StorageError::Transport {
            failed: vec!["a".into(), "b".into()],
            message: "conflict".into(),
        };
        assert_eq!(err.to_string(), "bulk write failed for 2 document(s): conflict");
    }

    #[test]
    fn not_found_message() {
        assert_eq!(
            StorageError::not_found("table", "abc").to_string(),
            "table not found: abc"
        );
    }
}
