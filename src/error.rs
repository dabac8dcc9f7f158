//! Error types for persistq
//!
//! Failures raised while replaying a transaction are kept distinct from
//! ordinary store access failures so the broker layer above can apply a
//! different redelivery policy to each.

use crate::message::TransactionId;
use thiserror::Error;

/// Result type alias for persistq operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for persistq
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Commit of transaction {txid} failed: {source}")]
    CommitFailed {
        txid: TransactionId,
        source: Box<StoreError>,
    },

    #[error("Transaction {0} is already finalized")]
    TransactionFinalized(TransactionId),

    #[error("Recovery error: {0}")]
    Recovery(String),
}

impl StoreError {
    /// Create a store error with operation context
    ///
    /// # Example
    /// ```ignore
    /// StoreError::store("add-message", "disk full")
    /// // produces: "Store error: add-message: disk full"
    /// ```
    pub fn store(operation: &str, detail: impl Into<String>) -> Self {
        StoreError::Store(format!("{}: {}", operation, detail.into()))
    }

    /// Create a recovery error from a message string
    pub fn recovery(detail: impl Into<String>) -> Self {
        StoreError::Recovery(detail.into())
    }

    /// Whether this failure was raised by transaction coordination rather
    /// than by an ordinary store access.
    pub fn is_transactional(&self) -> bool {
        matches!(
            self,
            StoreError::CommitFailed { .. } | StoreError::TransactionFinalized(_)
        )
    }
}
