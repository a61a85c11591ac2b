//! Data keys and the KeyManager that wraps them.
//!
//! A data key exists in exactly two forms: in memory inside a zeroizing
//! container, or wrapped under the master key. It is generated once per
//! record, re-wrapped on master key rotation, and never reused across
//! records.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead;
use crate::config::MasterKeyConfig;
use crate::error::{CryptoError, Result};

/// Data key length in bytes (256 bits).
pub const DATA_KEY_LEN: usize = 32;

/// A per-record symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; DATA_KEY_LEN]);

impl DataKey {
    /// Generate a fresh random key from the process CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; DATA_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; DATA_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub(crate) fn as_bytes(&self) -> &[u8; DATA_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never render key material.
        write!(f, "DataKey(****)")
    }
}

/// Algorithm tag carried by a wrapped key row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapAlgorithm {
    /// ChaCha20-Poly1305 under the master key.
    #[serde(rename = "chacha20poly1305")]
    ChaCha20Poly1305,
    /// Local development mode: key stored as-is.
    #[serde(rename = "plaintext-local")]
    PlaintextLocal,
}

/// A data key wrapped for persistence, one row per record.
///
/// Serializes to the JSON shape of the `envelope_keys.encrypted_data_key`
/// column. Immutable once written; rotation writes a replacement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedDataKey {
    /// How the key is wrapped.
    pub algorithm: WrapAlgorithm,

    /// Which master key wrapped it.
    pub key_id: String,

    /// Wrap nonce (empty in local mode).
    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,

    /// Poly1305 tag over the wrapped key (empty in local mode).
    #[serde(with = "hex::serde")]
    pub auth_tag: Vec<u8>,

    /// The wrapped key bytes.
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

/// Generates, wraps and unwraps data keys under one master key config.
///
/// Constructed once at startup from a validated [`MasterKeyConfig`] and
/// passed by reference to consumers; there is no global instance.
pub struct KeyManager {
    config: MasterKeyConfig,
}

impl KeyManager {
    /// Create a manager over a validated configuration.
    pub fn new(config: MasterKeyConfig) -> Self {
        Self { config }
    }

    /// The id of the master key this manager wraps under.
    pub fn key_id(&self) -> &str {
        self.config.key_id()
    }

    /// True if this manager runs in local development mode.
    pub fn is_local(&self) -> bool {
        self.config.is_local()
    }

    /// Generate a fresh data key.
    pub fn generate_data_key(&self) -> DataKey {
        DataKey::generate()
    }

    /// Wrap a data key for persistence.
    ///
    /// Envelope mode encrypts under the master key with a fresh nonce.
    /// Local mode is a deliberate passthrough: the key bytes go into the
    /// ciphertext field unencrypted.
    pub fn wrap_key(&self, data_key: &DataKey) -> Result<WrappedDataKey> {
        match self.config.material() {
            Some(master) => {
                let (iv, ciphertext, auth_tag) = aead::seal(master, data_key.as_bytes())?;
                Ok(WrappedDataKey {
                    algorithm: WrapAlgorithm::ChaCha20Poly1305,
                    key_id: self.config.key_id().to_string(),
                    iv,
                    auth_tag,
                    ciphertext,
                })
            }
            None => Ok(WrappedDataKey {
                algorithm: WrapAlgorithm::PlaintextLocal,
                key_id: self.config.key_id().to_string(),
                iv: Vec::new(),
                auth_tag: Vec::new(),
                ciphertext: data_key.as_bytes().to_vec(),
            }),
        }
    }

    /// Unwrap a persisted data key.
    ///
    /// Tag mismatch, a wrong master key, or a corrupted field fails closed
    /// with [`CryptoError::Integrity`]. A wrapped key whose algorithm does
    /// not match the configured mode is treated the same way.
    pub fn unwrap_key(&self, wrapped: &WrappedDataKey) -> Result<DataKey> {
        match (self.config.material(), wrapped.algorithm) {
            (Some(master), WrapAlgorithm::ChaCha20Poly1305) => {
                let mut plain =
                    aead::open(master, &wrapped.iv, &wrapped.ciphertext, &wrapped.auth_tag)?;
                let key = key_from_slice(&plain)?;
                plain.zeroize();
                Ok(key)
            }
            (None, WrapAlgorithm::PlaintextLocal) => key_from_slice(&wrapped.ciphertext),
            (_, algorithm) => Err(CryptoError::Integrity(format!(
                "wrapped key algorithm {algorithm:?} does not match configured mode"
            ))),
        }
    }

    /// Re-wrap a key under a successor master key.
    ///
    /// The record body is untouched; only the envelope changes. Callers
    /// apply the result atomically per record.
    pub fn rewrap(&self, wrapped: &WrappedDataKey, next: &KeyManager) -> Result<WrappedDataKey> {
        let data_key = self.unwrap_key(wrapped)?;
        next.wrap_key(&data_key)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyManager({:?})", self.config)
    }
}

fn key_from_slice(bytes: &[u8]) -> Result<DataKey> {
    let arr: [u8; DATA_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::Integrity(format!("invalid data key length: {}", bytes.len())))?;
    Ok(DataKey::from_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn envelope_manager(byte: u8) -> KeyManager {
        KeyManager::new(MasterKeyConfig::envelope("mk-test", &[byte; 32]).unwrap())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let manager = envelope_manager(0x11);
        let key = manager.generate_data_key();

        let wrapped = manager.wrap_key(&key).unwrap();
        assert_eq!(wrapped.algorithm, WrapAlgorithm::ChaCha20Poly1305);
        assert_eq!(wrapped.key_id, "mk-test");
        assert_ne!(wrapped.ciphertext, key.as_bytes().to_vec());

        let unwrapped = manager.unwrap_key(&wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_unwrap_with_wrong_master_key_fails() {
        let a = envelope_manager(0x11);
        let b = envelope_manager(0x22);

        let wrapped = a.wrap_key(&a.generate_data_key()).unwrap();
        assert!(matches!(
            b.unwrap_key(&wrapped),
            Err(CryptoError::Integrity(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let manager = envelope_manager(0x11);
        let mut wrapped = manager.wrap_key(&manager.generate_data_key()).unwrap();
        wrapped.ciphertext[0] ^= 0x01;
        assert!(manager.unwrap_key(&wrapped).is_err());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let manager = envelope_manager(0x11);
        let mut wrapped = manager.wrap_key(&manager.generate_data_key()).unwrap();
        wrapped.auth_tag[15] ^= 0x80;
        assert!(manager.unwrap_key(&wrapped).is_err());
    }

    #[test]
    fn test_local_mode_is_passthrough() {
        let manager = KeyManager::new(MasterKeyConfig::local(Environment::Development).unwrap());
        let key = manager.generate_data_key();

        let wrapped = manager.wrap_key(&key).unwrap();
        assert_eq!(wrapped.algorithm, WrapAlgorithm::PlaintextLocal);
        assert!(wrapped.iv.is_empty());
        assert_eq!(wrapped.ciphertext, key.as_bytes().to_vec());

        assert_eq!(manager.unwrap_key(&wrapped).unwrap(), key);
    }

    #[test]
    fn test_mode_mismatch_fails_closed() {
        let local = KeyManager::new(MasterKeyConfig::local(Environment::Development).unwrap());
        let envelope = envelope_manager(0x11);

        let local_wrapped = local.wrap_key(&local.generate_data_key()).unwrap();
        assert!(envelope.unwrap_key(&local_wrapped).is_err());

        let env_wrapped = envelope.wrap_key(&envelope.generate_data_key()).unwrap();
        assert!(local.unwrap_key(&env_wrapped).is_err());
    }

    #[test]
    fn test_rewrap_preserves_key() {
        let old = envelope_manager(0x11);
        let new = envelope_manager(0x22);

        let key = old.generate_data_key();
        let wrapped = old.wrap_key(&key).unwrap();

        let rewrapped = old.rewrap(&wrapped, &new).unwrap();
        assert_eq!(rewrapped.key_id, "mk-test");
        assert_eq!(new.unwrap_key(&rewrapped).unwrap(), key);
        assert!(old.unwrap_key(&rewrapped).is_err());
    }

    #[test]
    fn test_wrapped_key_json_shape() {
        let manager = envelope_manager(0x11);
        let wrapped = manager.wrap_key(&manager.generate_data_key()).unwrap();

        let json = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(json["algorithm"], "chacha20poly1305");
        assert_eq!(json["keyId"], "mk-test");
        assert!(json["iv"].is_string());
        assert!(json["authTag"].is_string());
        assert!(json["ciphertext"].is_string());

        let back: WrappedDataKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, wrapped);
    }

    #[test]
    fn test_data_keys_are_unique() {
        let manager = envelope_manager(0x11);
        assert_ne!(manager.generate_data_key(), manager.generate_data_key());
    }
}
