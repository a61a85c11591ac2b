//! Master key configuration, validated once at startup.
//!
//! Two modes:
//! - `Envelope`: data keys are wrapped under a 32-byte master key. The
//!   production path.
//! - `Local`: data keys are stored as-is. A development convenience only;
//!   the constructor refuses it outside a development environment.
//!
//! A bad configuration is an error at construction, never at first use.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Required master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Deployment environment, set explicitly by the embedding process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production deployment. Local key mode is refused.
    Production,
    /// Development or test deployment.
    Development,
}

/// Validated master key configuration.
pub struct MasterKeyConfig {
    mode: Mode,
}

enum Mode {
    Local,
    Envelope {
        key_id: String,
        material: Zeroizing<[u8; MASTER_KEY_LEN]>,
    },
}

impl MasterKeyConfig {
    /// Envelope mode under the given master key.
    ///
    /// The key must be exactly 32 bytes. Anything else is rejected here:
    /// no truncation, no padding.
    pub fn envelope(key_id: impl Into<String>, material: &[u8]) -> Result<Self> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(CryptoError::Configuration(
                "master key id must not be empty".into(),
            ));
        }
        if material.len() != MASTER_KEY_LEN {
            return Err(CryptoError::Configuration(format!(
                "master key must be exactly {MASTER_KEY_LEN} bytes, got {}",
                material.len()
            )));
        }

        let mut bytes = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        bytes.copy_from_slice(material);

        Ok(Self {
            mode: Mode::Envelope {
                key_id,
                material: bytes,
            },
        })
    }

    /// Local (plaintext) mode. Development only.
    pub fn local(environment: Environment) -> Result<Self> {
        if environment == Environment::Production {
            return Err(CryptoError::Configuration(
                "local key mode is not allowed in production".into(),
            ));
        }
        Ok(Self { mode: Mode::Local })
    }

    /// True in local mode.
    pub fn is_local(&self) -> bool {
        matches!(self.mode, Mode::Local)
    }

    /// The key id wrapped keys will carry ("local" in local mode).
    pub fn key_id(&self) -> &str {
        match &self.mode {
            Mode::Local => "local",
            Mode::Envelope { key_id, .. } => key_id,
        }
    }

    /// The master key bytes, envelope mode only.
    pub(crate) fn material(&self) -> Option<&[u8; MASTER_KEY_LEN]> {
        match &self.mode {
            Mode::Local => None,
            Mode::Envelope { material, .. } => Some(&**material),
        }
    }
}

impl fmt::Debug for MasterKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never render key material.
        match &self.mode {
            Mode::Local => write!(f, "MasterKeyConfig(local)"),
            Mode::Envelope { key_id, .. } => write!(f, "MasterKeyConfig(envelope, {key_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_requires_exactly_32_bytes() {
        assert!(MasterKeyConfig::envelope("mk-1", &[0u8; 32]).is_ok());
        assert!(MasterKeyConfig::envelope("mk-1", &[0u8; 31]).is_err());
        assert!(MasterKeyConfig::envelope("mk-1", &[0u8; 33]).is_err());
        assert!(MasterKeyConfig::envelope("mk-1", &[]).is_err());
    }

    #[test]
    fn test_empty_key_id_rejected() {
        assert!(MasterKeyConfig::envelope("", &[0u8; 32]).is_err());
    }

    #[test]
    fn test_local_mode_gated_by_environment() {
        assert!(MasterKeyConfig::local(Environment::Development).is_ok());
        assert!(matches!(
            MasterKeyConfig::local(Environment::Production),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_hides_material() {
        let config = MasterKeyConfig::envelope("mk-1", &[0xAA; 32]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("aa"));
        assert!(rendered.contains("mk-1"));
    }
}
