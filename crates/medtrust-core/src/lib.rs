//! # medtrust-core
//!
//! Pure primitives for the medtrust kernel: identifiers, content hashing,
//! Merkle commitments, and the permission/emergency/audit domain model.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data structures the rest of the workspace moves
//! around.
//!
//! ## Key Types
//!
//! - [`ContentHash`] - 32-byte blake3 hash, the unit of integrity
//! - [`MerkleTree`] / [`MerkleProof`] - batch commitments and inclusion proofs
//! - [`AuditEvent`] - an immutable, content-addressed security event
//! - [`Permission`] - a standing access grant and its lifecycle status
//! - [`EmergencyAccess`] - a time-bound, urgency-gated access request
//!
//! ## Canonicalization
//!
//! Audit events are hashed over deterministic CBOR so the same event
//! produces identical bytes (and thus identical hashes) everywhere. See
//! the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod emergency;
pub mod error;
pub mod event;
pub mod merkle;
pub mod permission;
pub mod record;
pub mod time;
pub mod types;

pub use canonical::{canonical_details_bytes, canonical_event_bytes};
pub use crypto::{ContentHash, RootSignature, SigningIdentity, VerifyingIdentity};
pub use emergency::{EmergencyAccess, EmergencyStatus, UrgencyLevel, VerificationCode};
pub use error::CoreError;
pub use event::{AuditAction, AuditEvent, AuditEventBuilder, AuditResult, ClientInfo, SealedBatch};
pub use merkle::{MerkleProof, MerkleTree, Side};
pub use permission::{ActionType, Permission, PermissionStatus};
pub use record::{Actor, ActorRole, Patient, RecordMeta};
pub use time::now_millis;
pub use types::{AccessId, ActorId, EventId, PatientId, PermissionId, RecordId};
