//! Error types for the access module.
//!
//! Denials are deliberately generic: callers learn that access was
//! denied, not which attribute failed. The audit trail carries the
//! specifics.

use thiserror::Error;

use medtrust_audit::AuditError;
use medtrust_store::StoreError;

/// Errors that can occur during authorization operations.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No matching active permission. The message stays generic.
    #[error("Access denied")]
    Denied,

    /// Emergency or standing access past its expiry.
    #[error("Emergency access has expired")]
    ExpiredAccess,

    /// The requester is unknown, inactive, or not clinical.
    #[error("Invalid requester or insufficient permissions")]
    InvalidRequester,

    /// The patient is unknown or inactive.
    #[error("Patient not found")]
    PatientNotFound,

    /// Unknown record, permission, or access id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Audit error.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AccessError>;
