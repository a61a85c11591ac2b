//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur during key and cipher operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid or missing master key material at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Authentication failed: tampered ciphertext, wrong key, or a
    /// corrupted field. Always fail closed.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Encryption could not be performed.
    #[error("encryption error: {0}")]
    Encryption(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
