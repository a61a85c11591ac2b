//! # medtrust-store
//!
//! Persistence for the medtrust kernel. The [`Store`] trait is the
//! abstract interface; [`SqliteStore`] is the primary backend and
//! [`MemoryStore`] the test backend with identical semantics.
//!
//! The store owns the invariants the domain depends on:
//! - at most one Active permission per `(record_id, grantee_id, action)`
//! - permission and emergency transitions are compare-and-swap, so a
//!   revoke racing a check cannot resurrect stale authorization
//! - audit events are append-only; nothing updates or deletes them

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::Store;
