//! Audit events: the immutable record of every security-relevant transition.
//!
//! An event is append-only. Once logged, it is never edited or deleted;
//! corrections are new events. Batches of events are the leaves fed to the
//! Merkle tree for external commitment.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_details_bytes, canonical_event_bytes};
use crate::crypto::ContentHash;
use crate::time::now_millis;
use crate::types::{ActorId, EventId};

/// What happened, as a stable discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum AuditAction {
    // Record actions (0x0000 - 0x00FF)
    /// A record was created and encrypted.
    RecordCreated = 0x0001,
    /// A record was decrypted and returned to a caller.
    RecordAccessed = 0x0002,
    /// A record body was replaced.
    RecordUpdated = 0x0003,
    /// A record's content hash was checked against its plaintext.
    IntegrityChecked = 0x0004,

    // Permission actions (0x0100 - 0x01FF)
    /// A standing permission was requested.
    PermissionRequested = 0x0100,
    /// A requested permission became active.
    PermissionGranted = 0x0101,
    /// An active permission was revoked.
    PermissionRevoked = 0x0102,
    /// An active permission lapsed past its expiry.
    PermissionExpired = 0x0103,
    /// An access check was evaluated.
    AccessChecked = 0x0104,

    // Emergency actions (0x0200 - 0x02FF)
    /// Emergency access was requested.
    EmergencyRequested = 0x0200,
    /// A critical-urgency request was approved without a supervisor.
    EmergencyAutoApproved = 0x0201,
    /// A supervisor approved a pending request.
    EmergencyApproved = 0x0202,
    /// An emergency grant was used to reach a record.
    EmergencyAccessed = 0x0203,
    /// An emergency grant was revoked.
    EmergencyRevoked = 0x0204,

    // Key and sealing actions (0x0300 - 0x03FF)
    /// Envelope keys were re-wrapped under a new master key.
    KeyRotated = 0x0300,
    /// An audit batch was sealed into a Merkle root.
    BatchSealed = 0x0301,
}

impl AuditAction {
    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::RecordCreated),
            0x0002 => Some(Self::RecordAccessed),
            0x0003 => Some(Self::RecordUpdated),
            0x0004 => Some(Self::IntegrityChecked),
            0x0100 => Some(Self::PermissionRequested),
            0x0101 => Some(Self::PermissionGranted),
            0x0102 => Some(Self::PermissionRevoked),
            0x0103 => Some(Self::PermissionExpired),
            0x0104 => Some(Self::AccessChecked),
            0x0200 => Some(Self::EmergencyRequested),
            0x0201 => Some(Self::EmergencyAutoApproved),
            0x0202 => Some(Self::EmergencyApproved),
            0x0203 => Some(Self::EmergencyAccessed),
            0x0204 => Some(Self::EmergencyRevoked),
            0x0300 => Some(Self::KeyRotated),
            0x0301 => Some(Self::BatchSealed),
            _ => None,
        }
    }

    /// Check if this is a record action.
    pub fn is_record(self) -> bool {
        (self.to_u16() & 0xFF00) == 0x0000
    }

    /// Check if this is a permission action.
    pub fn is_permission(self) -> bool {
        (self.to_u16() & 0xFF00) == 0x0100
    }

    /// Check if this is an emergency action.
    pub fn is_emergency(self) -> bool {
        (self.to_u16() & 0xFF00) == 0x0200
    }
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuditResult {
    /// The operation succeeded.
    Success = 0,
    /// The operation was denied or failed.
    Failure = 1,
}

impl AuditResult {
    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Caller-side context attached to access attempts.
///
/// Committed into the details hash, never stored in the event row itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Remote IP address as reported by the API layer.
    pub ip_address: String,
    /// User agent string as reported by the API layer.
    pub user_agent: String,
}

impl ClientInfo {
    /// Construct client info.
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Render as a details fragment.
    pub fn to_details(&self) -> serde_json::Value {
        serde_json::json!({
            "ip": self.ip_address,
            "user_agent": self.user_agent,
        })
    }
}

/// An immutable, content-addressed audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Content address: blake3 of the canonical event bytes.
    pub event_id: EventId,

    /// Who performed (or attempted) the operation.
    pub actor_id: ActorId,

    /// What happened.
    pub action: AuditAction,

    /// The record, permission, or access id the operation touched.
    pub resource_id: String,

    /// Whether the operation succeeded.
    pub result: AuditResult,

    /// When the event was logged (Unix milliseconds).
    pub timestamp: i64,

    /// blake3 over the canonical CBOR of the free-form details map.
    ///
    /// Details carry context (client info, public denial reasons) without
    /// putting it in the clear inside the event row. Never key material,
    /// never plaintext.
    pub details_hash: ContentHash,
}

impl AuditEvent {
    /// Recompute this event's content address.
    pub fn compute_id(&self) -> EventId {
        EventId(ContentHash::hash(&canonical_event_bytes(self)).0)
    }

    /// The hash fed to the Merkle tree when the event is sealed.
    pub fn leaf_hash(&self) -> ContentHash {
        ContentHash(self.event_id.0)
    }
}

/// A sealed batch of audit events: the Merkle root, the service
/// signature over it, and enough bookkeeping to locate the batch again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBatch {
    /// Merkle root over the batch's event ids, in insertion order.
    pub root: ContentHash,

    /// Service signature over the root.
    pub signature: crate::crypto::RootSignature,

    /// How many events the root commits to.
    pub event_count: u32,

    /// When the batch was sealed (Unix ms).
    pub sealed_at: i64,
}

/// Builder for audit events.
pub struct AuditEventBuilder {
    actor_id: ActorId,
    action: AuditAction,
    resource_id: String,
    result: AuditResult,
    timestamp: i64,
    details_hash: ContentHash,
}

impl AuditEventBuilder {
    /// Start building an event. Defaults: success, now, empty details.
    pub fn new(actor_id: ActorId, action: AuditAction, resource_id: impl Into<String>) -> Self {
        Self {
            actor_id,
            action,
            resource_id: resource_id.into(),
            result: AuditResult::Success,
            timestamp: now_millis(),
            details_hash: ContentHash::hash(&[]),
        }
    }

    /// Set the outcome.
    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Commit a details map.
    ///
    /// A map that fails canonicalization (floats) commits the empty hash;
    /// logging must not fail the operation being audited.
    pub fn details(mut self, details: &serde_json::Value) -> Self {
        self.details_hash = canonical_details_bytes(details)
            .map(|bytes| ContentHash::hash(&bytes))
            .unwrap_or_else(|_| ContentHash::hash(&[]));
        self
    }

    /// Finalize the event and compute its content address.
    pub fn build(self) -> AuditEvent {
        let mut event = AuditEvent {
            event_id: EventId::ZERO,
            actor_id: self.actor_id,
            action: self.action,
            resource_id: self.resource_id,
            result: self.result,
            timestamp: self.timestamp,
            details_hash: self.details_hash,
        };
        event.event_id = event.compute_id();
        event
    }
}
