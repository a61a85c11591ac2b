//! ChaCha20-Poly1305 seal/open with the tag carried separately.
//!
//! The persisted shapes ([`WrappedDataKey`](crate::WrappedDataKey),
//! [`EncryptedPayload`](crate::EncryptedPayload)) store iv, auth tag and
//! ciphertext as distinct fields, so the 16-byte Poly1305 tag is split off
//! the ciphertext tail here and re-joined before opening.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, Result};

/// Nonce length in bytes (96 bits).
pub(crate) const NONCE_LEN: usize = 12;

/// Poly1305 tag length in bytes (128 bits).
pub(crate) const TAG_LEN: usize = 16;

/// Encrypt under a fresh random nonce.
///
/// Returns `(iv, ciphertext, auth_tag)`. A new nonce is drawn from the
/// CSPRNG on every call; nonce reuse under one key is structurally
/// impossible through this path.
pub(crate) fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let mut iv = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut combined = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let tag = combined.split_off(combined.len() - TAG_LEN);
    Ok((iv.to_vec(), combined, tag))
}

/// Decrypt and authenticate.
///
/// Tag verification happens before any byte is returned; a mismatch or a
/// malformed field is an integrity failure, never partial plaintext.
pub(crate) fn open(key: &[u8; 32], iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != NONCE_LEN {
        return Err(CryptoError::Integrity(format!(
            "invalid iv length: {}",
            iv.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::Integrity(format!(
            "invalid auth tag length: {}",
            tag.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::Integrity(e.to_string()))?;

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(iv), combined.as_ref())
        .map_err(|_| CryptoError::Integrity("authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [0x21u8; 32];
        let (iv, ct, tag) = seal(&key, b"bp 120/80").unwrap();
        assert_eq!(tag.len(), TAG_LEN);
        assert_eq!(open(&key, &iv, &ct, &tag).unwrap(), b"bp 120/80");
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = [0x21u8; 32];
        let (iv1, _, _) = seal(&key, b"same input").unwrap();
        let (iv2, _, _) = seal(&key, b"same input").unwrap();
        assert_ne!(iv1, iv2);
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = [0x21u8; 32];
        let (iv, ct, mut tag) = seal(&key, b"secret").unwrap();
        tag[0] ^= 0x01;
        assert!(open(&key, &iv, &ct, &tag).is_err());
    }

    #[test]
    fn test_bad_iv_length_fails_closed() {
        let key = [0x21u8; 32];
        let (_, ct, tag) = seal(&key, b"secret").unwrap();
        assert!(matches!(
            open(&key, &[0u8; 7], &ct, &tag),
            Err(CryptoError::Integrity(_))
        ));
    }
}
