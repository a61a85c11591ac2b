//! Record metadata and the actor/patient directory.
//!
//! Record plaintext never appears here: the metadata row carries the
//! content hash and a reference into the blob store, nothing else. The
//! directory backs requester-role and patient-existence checks for
//! emergency access.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::ContentHash;
use crate::types::{ActorId, PatientId, RecordId};

/// Metadata for one encrypted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Unique id of the record.
    pub record_id: RecordId,

    /// The patient the record belongs to.
    pub patient_id: PatientId,

    /// The actor who created the record (implicit grantor).
    pub owner_id: ActorId,

    /// blake3 of the plaintext, taken before encryption.
    pub content_hash: ContentHash,

    /// Address of the ciphertext in the blob store (hash of the payload
    /// bytes as stored).
    pub payload_ref: ContentHash,

    /// When the record was created (Unix ms).
    pub created_at: i64,

    /// When the record body was last replaced (Unix ms).
    pub updated_at: i64,

    /// Bumped on every body replacement.
    pub version: u32,
}

impl RecordMeta {
    /// Metadata for a freshly created record.
    pub fn new(
        record_id: RecordId,
        patient_id: PatientId,
        owner_id: ActorId,
        content_hash: ContentHash,
        payload_ref: ContentHash,
        now: i64,
    ) -> Self {
        Self {
            record_id,
            patient_id,
            owner_id,
            content_hash,
            payload_ref,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Apply a body replacement.
    pub fn replace_body(&mut self, content_hash: ContentHash, payload_ref: ContentHash, now: i64) {
        self.content_hash = content_hash;
        self.payload_ref = payload_ref;
        self.updated_at = now;
        self.version += 1;
    }
}

/// Role of an actor in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Attending or consulting physician.
    Physician,
    /// Nursing staff.
    Nurse,
    /// Pre-hospital emergency responder.
    Paramedic,
    /// Approves pending emergency access.
    Supervisor,
    /// Platform administration; no clinical access.
    Admin,
}

impl ActorRole {
    /// Roles recognized as clinical for emergency access requests.
    pub fn is_clinical(&self) -> bool {
        matches!(
            self,
            ActorRole::Physician | ActorRole::Nurse | ActorRole::Paramedic
        )
    }

    /// Stable text form, matching the persisted column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Physician => "physician",
            ActorRole::Nurse => "nurse",
            ActorRole::Paramedic => "paramedic",
            ActorRole::Supervisor => "supervisor",
            ActorRole::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physician" => Ok(ActorRole::Physician),
            "nurse" => Ok(ActorRole::Nurse),
            "paramedic" => Ok(ActorRole::Paramedic),
            "supervisor" => Ok(ActorRole::Supervisor),
            "admin" => Ok(ActorRole::Admin),
            other => Err(format!("unknown actor role: {other}")),
        }
    }
}

/// A directory entry for a platform actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Unique id of the actor.
    pub actor_id: ActorId,
    /// The actor's role.
    pub role: ActorRole,
    /// Deactivated actors fail every authorization check.
    pub active: bool,
}

impl Actor {
    /// Create an active directory entry.
    pub fn new(actor_id: ActorId, role: ActorRole) -> Self {
        Self {
            actor_id,
            role,
            active: true,
        }
    }
}

/// A directory entry for a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Unique id of the patient.
    pub patient_id: PatientId,
    /// Inactive patients cannot be targeted by emergency access.
    pub active: bool,
}

impl Patient {
    /// Create an active patient entry.
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinical_roles() {
        assert!(ActorRole::Physician.is_clinical());
        assert!(ActorRole::Paramedic.is_clinical());
        assert!(!ActorRole::Supervisor.is_clinical());
        assert!(!ActorRole::Admin.is_clinical());
    }

    #[test]
    fn test_role_text_roundtrip() {
        for role in [
            ActorRole::Physician,
            ActorRole::Nurse,
            ActorRole::Paramedic,
            ActorRole::Supervisor,
            ActorRole::Admin,
        ] {
            assert_eq!(role.as_str().parse::<ActorRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_replace_body_bumps_version() {
        let mut meta = RecordMeta::new(
            RecordId::from("record-1"),
            PatientId::from("pat-ito"),
            ActorId::from("dr-wren"),
            ContentHash::hash(b"v1"),
            ContentHash::hash(b"ct1"),
            1000,
        );
        assert_eq!(meta.version, 1);

        meta.replace_body(ContentHash::hash(b"v2"), ContentHash::hash(b"ct2"), 2000);
        assert_eq!(meta.version, 2);
        assert_eq!(meta.updated_at, 2000);
        assert_eq!(meta.created_at, 1000);
    }
}
