//! Error types for realmdb core.

use thiserror::Error;

use crate::transaction::TransactionState;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] realmdb_storage::StorageError),

    /// An operation was attempted on a transaction that already reached
    /// a terminal state.
    #[error("transaction is closed ({state})")]
    TransactionClosed {
        /// The terminal state the transaction is in.
        state: TransactionState,
    },
}

impl CoreError {
    /// Creates a transaction closed error.
    #[must_use]
    pub fn transaction_closed(state: TransactionState) -> Self {
        Self::TransactionClosed { state }
    }
}
