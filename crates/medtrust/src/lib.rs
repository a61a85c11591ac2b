//! # medtrust
//!
//! The unified API for the medtrust kernel - the trust-and-access core of
//! a medical-record platform.
//!
//! ## Overview
//!
//! The kernel protects record plaintext with per-record envelope
//! encryption under a rotating master key, proves batches have not been
//! tampered with via Merkle commitments, and gates every decryption with
//! an audited permission/emergency state machine. Everything fails
//! closed.
//!
//! ## Key Concepts
//!
//! - **Envelope encryption**: every record has its own data key, wrapped
//!   under the master key. The master key never touches bulk data.
//! - **Single choke point**: a decrypt happens only after the access
//!   engine (or the emergency coordinator) says yes. There is no bypass.
//! - **Append-only audit**: every check, grant, denial and decrypt is an
//!   immutable event; batches are sealed into signed Merkle roots and
//!   published to the ledger best-effort.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medtrust::{MemoryBlobStore, Vault, VaultConfig};
//! use medtrust::core::{ActorId, SigningIdentity};
//! use medtrust::crypto::MasterKeyConfig;
//! use medtrust::store::SqliteStore;
//!
//! async fn example() {
//!     let master_key = MasterKeyConfig::envelope("mk-2026-08", &[0u8; 32]).unwrap();
//!     let config = VaultConfig::new(master_key, ActorId::from("svc-kernel"));
//!
//!     let store = SqliteStore::open("kernel.db").unwrap();
//!     let vault = Vault::new(
//!         SigningIdentity::generate(),
//!         store,
//!         Arc::new(MemoryBlobStore::new()),
//!         config,
//!     );
//!
//!     // let meta = vault
//!     //     .create_record(record_id, patient_id, owner_id, b"...")
//!     //     .await
//!     //     .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `medtrust::core` - primitives (ids, hashing, Merkle, domain model)
//! - `medtrust::crypto` - KeyManager and RecordCipher
//! - `medtrust::store` - storage abstraction and SQLite
//! - `medtrust::audit` - audit trail and sealing
//! - `medtrust::access` - permission and emergency engines

pub mod blob;
pub mod config;
pub mod error;
pub mod vault;

// Re-export component crates
pub use medtrust_access as access;
pub use medtrust_audit as audit;
pub use medtrust_core as core;
pub use medtrust_crypto as crypto;
pub use medtrust_store as store;

// Re-export main types for convenience
pub use blob::{BlobStore, MemoryBlobStore};
pub use config::{VaultCollaborators, VaultConfig};
pub use error::{Result, VaultError};
pub use vault::Vault;

// Re-export commonly used core types
pub use medtrust_core::{
    AccessId, ActionType, ActorId, AuditAction, AuditEvent, AuditResult, ClientInfo, ContentHash,
    EmergencyStatus, MerkleProof, MerkleTree, PatientId, Permission, PermissionId,
    PermissionStatus, RecordId, RecordMeta, SigningIdentity, UrgencyLevel,
};
