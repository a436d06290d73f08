//! Error types for core operations.

use crate::schema::SchemaErrors;
use lookup_model::ModelError;
use lookup_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The snapshot violates the schema grammar; nothing was mutated.
    #[error(transparent)]
    Schema(#[from] SchemaErrors),

    /// A model value is invalid.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The requested operation is not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
