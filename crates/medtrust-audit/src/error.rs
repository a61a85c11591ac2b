//! Error types for the audit module.

use thiserror::Error;

use medtrust_store::StoreError;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A batch could not be sealed.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// A sealed root is unknown.
    #[error("unknown seal: {0}")]
    UnknownSeal(String),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
