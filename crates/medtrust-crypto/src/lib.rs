//! # medtrust-crypto
//!
//! Envelope encryption for the medtrust kernel.
//!
//! ## Key Model
//!
//! Every record gets its own 256-bit data key at creation. The data key
//! encrypts the record body (ChaCha20-Poly1305) and is itself wrapped
//! under the master key, so the master key never touches bulk data.
//! Rotating the master key re-wraps data keys without re-encrypting any
//! record.
//!
//! - [`KeyManager`] - generates, wraps, unwraps and re-wraps data keys
//! - [`RecordCipher`] - authenticated encryption of record bodies
//! - [`MasterKeyConfig`] - startup-validated master key configuration
//!
//! ## Failure Stance
//!
//! Authentication failures are [`CryptoError::Integrity`] and fail closed:
//! no partial plaintext, no best-effort output. Key material lives in
//! zeroizing containers and never appears in logs or errors.

mod aead;
pub mod cipher;
pub mod config;
pub mod error;
pub mod keys;

pub use cipher::{EncryptedPayload, RecordCipher};
pub use config::{Environment, MasterKeyConfig};
pub use error::{CryptoError, Result};
pub use keys::{DataKey, KeyManager, WrapAlgorithm, WrappedDataKey};
