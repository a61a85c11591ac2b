//! # medtrust-audit
//!
//! The append-only audit trail and its external commitment path.
//!
//! Every security-relevant transition in the kernel lands here as an
//! [`AuditEvent`](medtrust_core::AuditEvent). Logging is local and never
//! blocks on external sinks; batches of events are periodically sealed
//! into a Merkle root, signed by the service identity, and published to
//! the ledger as a best-effort side effect. A delayed or failed
//! publication never rolls back a recorded event.

pub mod error;
pub mod ledger;
pub mod trail;

pub use error::{AuditError, Result};
pub use ledger::{Ledger, NullLedger, TX_COMMIT_PERMISSION_CHANGE, TX_PUBLISH_AUDIT_ROOT};
pub use trail::{AuditTrail, DEFAULT_BATCH_LIMIT};
