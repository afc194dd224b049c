//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A create collided with an existing key.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// String form of the colliding key.
        key: String,
    },

    /// A string could not be decoded into a key.
    #[error("invalid key format: {input:?}")]
    InvalidKeyFormat {
        /// The input that failed to parse.
        input: String,
    },

    /// A criteria term combined a field with an operator or value it
    /// does not support. Raised at build time, never at query time.
    #[error("unsupported field comparison: {field} {operator}")]
    UnsupportedField {
        /// Debug name of the offending field.
        field: String,
        /// The operator that was rejected.
        operator: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted snapshot could not be decoded.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates a duplicate key error from any displayable key.
    pub fn duplicate_key(key: impl ToString) -> Self {
        Self::DuplicateKey {
            key: key.to_string(),
        }
    }

    /// Creates an invalid key format error.
    pub fn invalid_key_format(input: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            input: input.into(),
        }
    }

    /// Creates an unsupported field error.
    pub fn unsupported_field(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::UnsupportedField {
            field: field.into(),
            operator: operator.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
