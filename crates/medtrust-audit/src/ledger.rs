//! The ledger collaborator: an append-only commitment sink.
//!
//! The kernel publishes sealed Merkle roots and permission-change
//! commitments through this narrow interface. Authorization decisions
//! never wait on it; submission failures degrade to a warning.

use async_trait::async_trait;

/// Transaction name used when publishing a sealed audit root.
pub const TX_PUBLISH_AUDIT_ROOT: &str = "PublishAuditRoot";

/// Transaction name used when committing a permission change.
pub const TX_COMMIT_PERMISSION_CHANGE: &str = "CommitPermissionChange";

/// Narrow submit/evaluate interface to the distributed ledger.
///
/// Implementations live outside the kernel (Fabric gateway, test stubs).
/// Errors are opaque; the kernel treats every failure the same way.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a transaction, returning its id.
    async fn submit(&self, transaction: &str, args: &[String]) -> anyhow::Result<String>;

    /// Evaluate a read-only transaction.
    async fn evaluate(&self, transaction: &str, args: &[String]) -> anyhow::Result<String>;
}

/// A ledger that accepts everything and stores nothing.
///
/// Default collaborator for deployments without a ledger and for tests
/// that don't observe publication.
pub struct NullLedger;

#[async_trait]
impl Ledger for NullLedger {
    async fn submit(&self, _transaction: &str, _args: &[String]) -> anyhow::Result<String> {
        Ok(String::from("null-tx"))
    }

    async fn evaluate(&self, _transaction: &str, _args: &[String]) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
