//! Error types for the Vault.

use thiserror::Error;

use medtrust_access::AccessError;
use medtrust_audit::AuditError;
use medtrust_crypto::CryptoError;
use medtrust_store::StoreError;

/// Errors that can occur during Vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Invalid configuration at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tamper detected: AEAD tag mismatch or content hash mismatch.
    /// Always fail closed; no partial plaintext leaves the Vault.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Authorization failure. Carries the generic public messages.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Unknown record, patient, or key row.
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

    /// Blob store collaborator failure.
    #[error("blob store error: {0}")]
    Blob(String),
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Configuration(msg) => VaultError::Configuration(msg),
            CryptoError::Integrity(msg) => VaultError::Integrity(msg),
            // Failing to encrypt is treated like tampering: nothing is
            // written and nothing is returned.
            CryptoError::Encryption(msg) => VaultError::Integrity(msg),
        }
    }
}

/// Result type for Vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
