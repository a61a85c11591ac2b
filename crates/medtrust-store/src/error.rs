//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row with the same id already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Compare-and-swap failed: the row is not in the expected state.
    #[error("invalid transition for {id}: currently {current}")]
    InvalidTransition {
        /// The row whose transition was refused.
        id: String,
        /// Its current status.
        current: String,
    },

    /// The active-permission uniqueness invariant would be violated.
    #[error("active permission already exists: {existing}")]
    UniquenessConflict {
        /// Id of the permission already holding the slot.
        existing: String,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
