//! Authenticated encryption of record bodies.
//!
//! One data key per record, one fresh nonce per encryption. The plaintext
//! is hashed (blake3) before encryption so integrity can be verified
//! against the Merkle commitments without consulting the ledger.

use serde::{Deserialize, Serialize};

use medtrust_core::ContentHash;

use crate::aead;
use crate::error::Result;
use crate::keys::DataKey;

/// An encrypted record body.
///
/// The algorithm always matches the record's [`WrappedDataKey`]
/// (ChaCha20-Poly1305); only the envelope key row carries the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Encryption nonce, unique per encryption.
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,

    /// Poly1305 tag over the ciphertext.
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,

    /// The encrypted record body.
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Serialized form stored in the blob store.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serialization cannot fail")
    }

    /// Parse the blob store form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::CryptoError::Integrity(e.to_string()))
    }

    /// Content address of the stored payload bytes.
    pub fn payload_ref(&self) -> ContentHash {
        ContentHash::hash(&self.to_bytes())
    }
}

/// Encrypts and decrypts record bodies with per-record data keys.
pub struct RecordCipher;

impl RecordCipher {
    /// Encrypt a record body under its data key.
    ///
    /// Draws a fresh nonce from the CSPRNG on every call.
    pub fn encrypt(plaintext: &[u8], key: &DataKey) -> Result<EncryptedPayload> {
        let (iv, ciphertext, auth_tag) = aead::seal(key.as_bytes(), plaintext)?;
        Ok(EncryptedPayload {
            iv,
            auth_tag,
            ciphertext,
        })
    }

    /// Decrypt a record body.
    ///
    /// The tag is verified before any plaintext is returned; failure is
    /// an integrity error and yields nothing.
    pub fn decrypt(payload: &EncryptedPayload, key: &DataKey) -> Result<Vec<u8>> {
        aead::open(
            key.as_bytes(),
            &payload.iv,
            &payload.ciphertext,
            &payload.auth_tag,
        )
    }

    /// Hash the plaintext for use as a Merkle leaf and integrity anchor.
    ///
    /// Taken before encryption, stored in the record metadata.
    pub fn content_hash(plaintext: &[u8]) -> ContentHash {
        ContentHash::hash(plaintext)
    }
}
