//! The access control engine: permission lifecycle and the single
//! authorization choke point.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use medtrust_audit::{AuditTrail, Ledger, TX_COMMIT_PERMISSION_CHANGE};
use medtrust_core::{
    now_millis, ActionType, ActorId, AuditAction, AuditEventBuilder, AuditResult, Permission,
    PermissionId, PermissionStatus, RecordId,
};
use medtrust_store::{Store, StoreError};

use crate::error::{AccessError, Result};
use crate::locks::KeyedLocks;

/// How long a ledger commitment may take before it is abandoned.
const LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a detailed access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is allowed.
    pub allowed: bool,
    /// Public reason, safe to surface to callers.
    pub reason: String,
    /// The permission that carried the decision, if one matched.
    pub permission_id: Option<PermissionId>,
}

impl AccessDecision {
    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            permission_id: None,
        }
    }
}

/// Owns the permission lifecycle and answers every access question.
///
/// Constructed once at startup and shared by reference; all state lives
/// in the store.
pub struct AccessControlEngine<S> {
    store: Arc<S>,
    audit: Arc<AuditTrail<S>>,
    ledger: Option<Arc<dyn Ledger>>,
    locks: KeyedLocks,
}

impl<S: Store> AccessControlEngine<S> {
    /// Create an engine over a store and audit trail.
    pub fn new(store: Arc<S>, audit: Arc<AuditTrail<S>>) -> Self {
        Self {
            store,
            audit,
            ledger: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Attach a ledger for permission-change commitments.
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Request a permission for `(record, grantee, action)`.
    ///
    /// Idempotent against the active slot: if an Active permission already
    /// covers the triple, it is returned instead of a duplicate.
    pub async fn request(
        &self,
        record_id: RecordId,
        grantee_id: ActorId,
        grantor_id: ActorId,
        action: ActionType,
    ) -> Result<Permission> {
        if record_id.is_empty() || grantee_id.is_empty() || grantor_id.is_empty() {
            return Err(AccessError::InvalidArgument(
                "record, grantee and grantor ids are required".into(),
            ));
        }

        let _guard = self.locks.acquire(&lock_key(&record_id, &grantee_id)).await;

        if let Some(existing) = self
            .store
            .find_active_permission(&record_id, &grantee_id, action)
            .await?
        {
            debug!(permission = %existing.permission_id, "request matched existing active permission");
            return Ok(existing);
        }

        let permission = Permission::request(
            record_id,
            grantee_id,
            grantor_id,
            action,
            now_millis(),
        );
        self.store.insert_permission(&permission).await?;

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    permission.grantor_id.clone(),
                    AuditAction::PermissionRequested,
                    permission.record_id.as_str(),
                )
                .details(&serde_json::json!({
                    "permission": permission.permission_id.as_str(),
                    "grantee": permission.grantee_id.as_str(),
                    "action": permission.action.as_str(),
                }))
                .build(),
            )
            .await?;

        Ok(permission)
    }

    /// Approve a requested permission: `Requested -> Active`.
    ///
    /// An expiry in the past is refused up front, mirroring the grant
    /// validation of the chain-side contract.
    pub async fn grant(
        &self,
        permission_id: &PermissionId,
        expires_at: Option<i64>,
    ) -> Result<Permission> {
        let now = now_millis();
        if let Some(expiry) = expires_at {
            if expiry <= now {
                return Err(AccessError::InvalidArgument(
                    "expiration time cannot be in the past".into(),
                ));
            }
        }

        let permission = match self.store.activate_permission(permission_id, expires_at).await {
            Ok(p) => p,
            Err(StoreError::NotFound(id)) => return Err(AccessError::NotFound(id)),
            Err(StoreError::InvalidTransition { id, current }) => {
                return Err(AccessError::Conflict(format!(
                    "permission {id} cannot be granted from status {current}"
                )))
            }
            Err(StoreError::UniquenessConflict { existing }) => {
                return Err(AccessError::Conflict(format!(
                    "active permission already exists: {existing}"
                )))
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            permission = %permission.permission_id,
            record = %permission.record_id,
            grantee = %permission.grantee_id,
            "permission granted"
        );

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    permission.grantor_id.clone(),
                    AuditAction::PermissionGranted,
                    permission.record_id.as_str(),
                )
                .details(&serde_json::json!({
                    "permission": permission.permission_id.as_str(),
                    "grantee": permission.grantee_id.as_str(),
                    "action": permission.action.as_str(),
                    "expires_at": permission.expires_at,
                }))
                .build(),
            )
            .await?;

        self.commit_change("grant", &permission).await;
        Ok(permission)
    }

    /// Revoke an active permission. Immediate: the next check denies.
    pub async fn revoke(&self, permission_id: &PermissionId) -> Result<Permission> {
        let current = self
            .store
            .get_permission(permission_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(permission_id.to_string()))?;

        let _guard = self
            .locks
            .acquire(&lock_key(&current.record_id, &current.grantee_id))
            .await;

        let permission = match self
            .store
            .transition_permission(
                permission_id,
                PermissionStatus::Active,
                PermissionStatus::Revoked,
            )
            .await
        {
            Ok(p) => p,
            Err(StoreError::InvalidTransition { id, current }) => {
                return Err(AccessError::Conflict(format!(
                    "permission {id} cannot be revoked from status {current}"
                )))
            }
            Err(StoreError::NotFound(id)) => return Err(AccessError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        info!(permission = %permission.permission_id, "permission revoked");

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    permission.grantor_id.clone(),
                    AuditAction::PermissionRevoked,
                    permission.record_id.as_str(),
                )
                .details(&serde_json::json!({
                    "permission": permission.permission_id.as_str(),
                    "grantee": permission.grantee_id.as_str(),
                }))
                .build(),
            )
            .await?;

        self.commit_change("revoke", &permission).await;
        Ok(permission)
    }

    /// The single choke point before any decrypt.
    ///
    /// True only if exactly one Active permission matches the triple and
    /// is unexpired. Serialized per `(record, grantee)` against
    /// grants/revokes on the same pair.
    pub async fn check_access(
        &self,
        record_id: &RecordId,
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<bool> {
        Ok(self
            .check_access_detailed(record_id, grantee_id, action)
            .await?
            .allowed)
    }

    /// Access check with a public reason attached.
    pub async fn check_access_detailed(
        &self,
        record_id: &RecordId,
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<AccessDecision> {
        let _guard = self.locks.acquire(&lock_key(record_id, grantee_id)).await;

        let now = now_millis();
        let decision = match self
            .store
            .find_active_permission(record_id, grantee_id, action)
            .await?
        {
            None => AccessDecision::deny("no active permission"),
            Some(permission) if permission.is_lapsed(now) => {
                // Lazy expiry: deny now, flip the status as bookkeeping.
                // A racing transition losing the CAS changes nothing.
                match self
                    .store
                    .transition_permission(
                        &permission.permission_id,
                        PermissionStatus::Active,
                        PermissionStatus::Expired,
                    )
                    .await
                {
                    Ok(expired) => {
                        self.audit
                            .log_event(
                                AuditEventBuilder::new(
                                    expired.grantor_id.clone(),
                                    AuditAction::PermissionExpired,
                                    expired.record_id.as_str(),
                                )
                                .details(&serde_json::json!({
                                    "permission": expired.permission_id.as_str(),
                                }))
                                .build(),
                            )
                            .await?;
                    }
                    Err(StoreError::InvalidTransition { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                AccessDecision::deny("permission expired")
            }
            Some(permission) => AccessDecision {
                allowed: true,
                reason: "access granted".to_string(),
                permission_id: Some(permission.permission_id),
            },
        };

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    grantee_id.clone(),
                    AuditAction::AccessChecked,
                    record_id.as_str(),
                )
                .result(if decision.allowed {
                    AuditResult::Success
                } else {
                    AuditResult::Failure
                })
                .details(&serde_json::json!({
                    "action": action.as_str(),
                    "reason": decision.reason,
                }))
                .build(),
            )
            .await?;

        Ok(decision)
    }

    /// Check one grantee against many records at once.
    pub async fn batch_check_access(
        &self,
        record_ids: &[RecordId],
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<Vec<(RecordId, bool)>> {
        let mut results = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let allowed = self.check_access(record_id, grantee_id, action).await?;
            results.push((record_id.clone(), allowed));
        }
        Ok(results)
    }

    /// All permissions where the actor is the grantee.
    pub async fn permissions_for(&self, grantee_id: &ActorId) -> Result<Vec<Permission>> {
        Ok(self.store.permissions_for_grantee(grantee_id).await?)
    }

    /// Commit a permission change to the ledger, best-effort.
    async fn commit_change(&self, kind: &str, permission: &Permission) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let args = vec![
            kind.to_string(),
            permission.permission_id.to_string(),
            permission.record_id.to_string(),
            permission.grantee_id.to_string(),
            permission.action.as_str().to_string(),
        ];

        match tokio::time::timeout(
            LEDGER_TIMEOUT,
            ledger.submit(TX_COMMIT_PERMISSION_CHANGE, &args),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(permission = %permission.permission_id, error = %e, "permission commitment failed");
            }
            Err(_) => {
                warn!(permission = %permission.permission_id, "permission commitment timed out");
            }
        }
    }
}

fn lock_key(record_id: &RecordId, grantee_id: &ActorId) -> String {
    format!("{record_id}\u{1f}{grantee_id}")
}
