//! Error types for the domain providers.

use realmdb_core::CoreError;
use realmdb_storage::StorageError;
use thiserror::Error;

/// Result alias used throughout the model crate.
pub type ModelResult<T> = Result<T, ModelError>;

/// Failures surfaced by the client and role providers.
///
/// Storage and transaction errors bubble up unchanged through [`ModelError::Core`];
/// the remaining variants are domain conditions the providers raise themselves.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A transaction or storage failure from the layers below.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A client with the same identity already exists in the realm.
    #[error("client already exists: {client_id}")]
    DuplicateClient {
        /// The conflicting client identifier (business key or encoded key).
        client_id: String,
    },

    /// A removal dependent refused the cascade, aborting the physical delete.
    #[error("client removal aborted during {step}")]
    CascadeAborted {
        /// Which cascade step vetoed the removal.
        step: &'static str,
    },
}

impl From<StorageError> for ModelError {
    fn from(err: StorageError) -> Self {
        ModelError::Core(CoreError::from(err))
    }
}
