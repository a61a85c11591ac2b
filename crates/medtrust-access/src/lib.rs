//! # medtrust-access
//!
//! Authorization for the medtrust kernel: the permission lifecycle and
//! the emergency override path.
//!
//! [`AccessControlEngine`] owns standing permissions
//! (`Requested -> Active -> {Revoked | Expired}`) and is the single
//! authority consulted before any decrypt. There is no bypass path: the
//! facade will not touch a data key without a positive answer from here
//! or from the [`EmergencyAccessCoordinator`].
//!
//! Check-then-act sequences are serialized per `(record, grantee)` or per
//! access id with keyed async locks, and every transition is
//! compare-and-swap at the store, so a revoke racing a check can never
//! leave a decrypt running on stale authorization.
//!
//! Every check, grant, denial and emergency use is recorded through
//! [`medtrust_audit::AuditTrail`].

pub mod emergency;
pub mod engine;
pub mod error;
pub mod locks;
pub mod notifier;

pub use emergency::{EmergencyAccessCoordinator, EmergencyRequestOutcome};
pub use engine::{AccessControlEngine, AccessDecision};
pub use error::{AccessError, Result};
pub use locks::KeyedLocks;
pub use notifier::{Notifier, NullNotifier};
