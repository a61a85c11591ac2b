//! Vault configuration, assembled explicitly at process start.

use medtrust_access::{Notifier, NullNotifier};
use medtrust_audit::{Ledger, NullLedger};
use medtrust_core::ActorId;
use medtrust_crypto::MasterKeyConfig;
use std::sync::Arc;

/// Configuration for the Vault.
///
/// There is no environment-variable magic here: the embedding process
/// builds this struct once, validation has already happened inside
/// [`MasterKeyConfig`], and the Vault is constructed from it.
pub struct VaultConfig {
    /// Validated master key configuration.
    pub master_key: MasterKeyConfig,

    /// Actor id the kernel uses for self-originated audit events
    /// (sealing, rotation).
    pub service_actor: ActorId,

    /// Events per sealed audit batch.
    pub seal_batch_limit: usize,
}

impl VaultConfig {
    /// Configuration with default batching.
    pub fn new(master_key: MasterKeyConfig, service_actor: ActorId) -> Self {
        Self {
            master_key,
            service_actor,
            seal_batch_limit: medtrust_audit::DEFAULT_BATCH_LIMIT,
        }
    }
}

/// External collaborators, defaulting to no-ops.
pub struct VaultCollaborators {
    /// Commitment sink for sealed roots and permission changes.
    pub ledger: Arc<dyn Ledger>,
    /// Supervisor escalation channel.
    pub notifier: Arc<dyn Notifier>,
}

impl Default for VaultCollaborators {
    fn default() -> Self {
        Self {
            ledger: Arc::new(NullLedger),
            notifier: Arc::new(NullNotifier),
        }
    }
}
