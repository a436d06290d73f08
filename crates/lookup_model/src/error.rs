//! Error types for the entity model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or upgrading model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An identifier string could not be parsed.
    #[error("invalid id '{value}'")]
    InvalidId {
        /// The offending input.
        value: String,
    },

    /// A table tag or field name violates the identifier grammar.
    #[error("\"{name}\" cannot include special characters, begin or end with a space, or begin with \"xml\" or a number")]
    InvalidIdentifier {
        /// The offending name.
        name: String,
    },

    /// A table tag is longer than allowed.
    #[error("Table ID must be between 1 and {max} characters, got {len}")]
    TagLength {
        /// Actual length.
        len: usize,
        /// Maximum length.
        max: usize,
    },

    /// An owner type string is not one of user, group, location.
    #[error("unknown owner type '{0}'")]
    UnknownOwnerType(String),

    /// A legacy document is missing a required attribute or has the wrong shape.
    #[error("malformed legacy document {doc_id}: {message}")]
    MalformedDocument {
        /// Document id (may be empty if the id itself is missing).
        doc_id: String,
        /// Description of the problem.
        message: String,
    },
}

impl ModelError {
    /// Creates a malformed document error.
    pub fn malformed(doc_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            doc_id: doc_id.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier { name: name.into() }
    }
}
