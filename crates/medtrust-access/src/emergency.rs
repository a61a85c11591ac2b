//! The emergency access coordinator: urgency-gated overrides of standing
//! permissions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use medtrust_audit::AuditTrail;
use medtrust_core::{
    now_millis, AccessId, ActorId, ActorRole, AuditAction, AuditEventBuilder, AuditResult,
    ClientInfo, EmergencyAccess, EmergencyStatus, PatientId, RecordId, UrgencyLevel,
};
use medtrust_store::{Store, StoreError};

use crate::error::{AccessError, Result};
use crate::locks::KeyedLocks;
use crate::notifier::Notifier;

/// How long a supervisor notification may take before it is abandoned.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Statuses an emergency grant can be revoked from.
const REVOCABLE: [EmergencyStatus; 4] = [
    EmergencyStatus::Requested,
    EmergencyStatus::PendingApproval,
    EmergencyStatus::AutoApproved,
    EmergencyStatus::Active,
];

/// Outcome of an emergency access request.
#[derive(Debug, Clone)]
pub struct EmergencyRequestOutcome {
    /// The live or newly created request.
    pub access: EmergencyAccess,
    /// True when an existing live request was returned instead of a new one.
    pub reused: bool,
    /// Human-readable outcome for the caller.
    pub message: String,
}

/// Coordinates emergency access: request, approval, use, revocation.
///
/// A specialization of the access engine's stance: every path is audited,
/// every check-then-act is serialized, and nothing here bypasses expiry.
pub struct EmergencyAccessCoordinator<S> {
    store: Arc<S>,
    audit: Arc<AuditTrail<S>>,
    notifier: Option<Arc<dyn Notifier>>,
    locks: KeyedLocks,
}

impl<S: Store> EmergencyAccessCoordinator<S> {
    /// Create a coordinator over a store and audit trail.
    pub fn new(store: Arc<S>, audit: Arc<AuditTrail<S>>) -> Self {
        Self {
            store,
            audit,
            notifier: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Attach a notifier for supervisor escalation.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Request emergency access to a patient's record.
    ///
    /// The requester must be an active clinical actor and the patient must
    /// exist. If the pair already has a live request, it is returned with
    /// `reused = true` instead of creating a duplicate. Critical urgency
    /// auto-approves; anything lower goes to a supervisor.
    pub async fn request_emergency_access(
        &self,
        requester_id: ActorId,
        patient_id: PatientId,
        record_id: RecordId,
        urgency: UrgencyLevel,
        justification: &str,
        client_info: &ClientInfo,
    ) -> Result<EmergencyRequestOutcome> {
        let requester = self.store.get_actor(&requester_id).await?;
        let is_clinical = requester
            .as_ref()
            .map(|a| a.active && a.role.is_clinical())
            .unwrap_or(false);
        if !is_clinical {
            self.audit_request_failure(&requester_id, &record_id, "unrecognized requester", client_info)
                .await?;
            return Err(AccessError::InvalidRequester);
        }

        let patient_known = self
            .store
            .get_patient(&patient_id)
            .await?
            .map(|p| p.active)
            .unwrap_or(false);
        if !patient_known {
            self.audit_request_failure(&requester_id, &record_id, "unknown patient", client_info)
                .await?;
            return Err(AccessError::PatientNotFound);
        }

        if self.store.get_record(&record_id).await?.is_none() {
            self.audit_request_failure(&requester_id, &record_id, "unknown record", client_info)
                .await?;
            return Err(AccessError::NotFound(record_id.to_string()));
        }

        let _guard = self
            .locks
            .acquire(&pair_key(&requester_id, &patient_id))
            .await;

        let now = now_millis();
        if let Some(existing) = self
            .store
            .find_live_emergency(&requester_id, &patient_id, now)
            .await?
        {
            self.audit
                .log_event(
                    AuditEventBuilder::new(
                        requester_id,
                        AuditAction::EmergencyRequested,
                        existing.access_id.as_str(),
                    )
                    .details(&serde_json::json!({
                        "reused": true,
                        "patient": existing.patient_id.as_str(),
                        "ip": client_info.ip_address,
                    }))
                    .build(),
                )
                .await?;
            return Ok(EmergencyRequestOutcome {
                access: existing,
                reused: true,
                message: "Existing active emergency access returned".to_string(),
            });
        }

        let access = EmergencyAccess::request(
            requester_id.clone(),
            patient_id,
            record_id,
            urgency,
            justification,
            now,
        );
        self.store.insert_emergency(&access).await?;

        info!(
            access = %access.access_id,
            urgency = %access.urgency,
            status = %access.status,
            "emergency access requested"
        );

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    requester_id.clone(),
                    AuditAction::EmergencyRequested,
                    access.access_id.as_str(),
                )
                .details(&serde_json::json!({
                    "patient": access.patient_id.as_str(),
                    "record": access.record_id.as_str(),
                    "urgency": access.urgency.as_str(),
                    "ip": client_info.ip_address,
                    "user_agent": client_info.user_agent,
                }))
                .build(),
            )
            .await?;

        let message = match access.status {
            EmergencyStatus::AutoApproved => {
                self.audit
                    .log_event(
                        AuditEventBuilder::new(
                            requester_id,
                            AuditAction::EmergencyAutoApproved,
                            access.access_id.as_str(),
                        )
                        .details(&serde_json::json!({
                            "urgency": access.urgency.as_str(),
                            "expiry_time": access.expiry_time,
                        }))
                        .build(),
                    )
                    .await?;
                "Emergency access auto-approved".to_string()
            }
            _ => {
                self.escalate_to_supervisors(&access).await;
                "Emergency access pending supervisor approval".to_string()
            }
        };

        Ok(EmergencyRequestOutcome {
            access,
            reused: false,
            message,
        })
    }

    /// Supervisor approval: `PendingApproval -> Active`.
    ///
    /// The expiry was fixed when the request was created; approval does
    /// not extend it, and approving an already-lapsed request fails.
    pub async fn approve_emergency_access(
        &self,
        access_id: &AccessId,
        supervisor_id: &ActorId,
    ) -> Result<EmergencyAccess> {
        let supervisor = self.store.get_actor(supervisor_id).await?;
        let is_supervisor = supervisor
            .map(|a| a.active && a.role == ActorRole::Supervisor)
            .unwrap_or(false);
        if !is_supervisor {
            return Err(AccessError::InvalidRequester);
        }

        let _guard = self.locks.acquire(access_id.as_str()).await;

        let current = self
            .store
            .get_emergency(access_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(access_id.to_string()))?;
        if now_millis() >= current.expiry_time {
            return Err(AccessError::ExpiredAccess);
        }

        let access = match self
            .store
            .transition_emergency(
                access_id,
                &[EmergencyStatus::PendingApproval],
                EmergencyStatus::Active,
            )
            .await
        {
            Ok(a) => a,
            Err(StoreError::InvalidTransition { id, current }) => {
                return Err(AccessError::Conflict(format!(
                    "access {id} cannot be approved from status {current}"
                )))
            }
            Err(StoreError::NotFound(id)) => return Err(AccessError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        info!(access = %access.access_id, supervisor = %supervisor_id, "emergency access approved");

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    supervisor_id.clone(),
                    AuditAction::EmergencyApproved,
                    access.access_id.as_str(),
                )
                .details(&serde_json::json!({
                    "requester": access.requester_id.as_str(),
                    "expiry_time": access.expiry_time,
                }))
                .build(),
            )
            .await?;

        Ok(access)
    }

    /// Use an emergency grant to reach a record.
    ///
    /// Requires a live grant, an unexpired clock, a matching record and a
    /// matching verification code. Every attempt is audited with client
    /// info, successful or not.
    pub async fn access_emergency_record(
        &self,
        access_id: &AccessId,
        record_id: &RecordId,
        verification_code: &str,
        client_info: &ClientInfo,
    ) -> Result<EmergencyAccess> {
        let _guard = self.locks.acquire(access_id.as_str()).await;

        let access = self
            .store
            .get_emergency(access_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(access_id.to_string()))?;

        let now = now_millis();

        // Expiry first: a lapsed grant reports expiry regardless of what
        // else is wrong, and gets its status flipped as bookkeeping.
        if access.status == EmergencyStatus::Expired || access.is_lapsed(now) {
            if access.is_lapsed(now) {
                let _ = self
                    .store
                    .transition_emergency(
                        access_id,
                        &[EmergencyStatus::AutoApproved, EmergencyStatus::Active],
                        EmergencyStatus::Expired,
                    )
                    .await;
            }
            self.audit_access_attempt(&access, "expired", client_info)
                .await?;
            return Err(AccessError::ExpiredAccess);
        }

        if !access.status.is_live() {
            self.audit_access_attempt(&access, "not active", client_info)
                .await?;
            return Err(AccessError::Denied);
        }

        if &access.record_id != record_id {
            self.audit_access_attempt(&access, "record mismatch", client_info)
                .await?;
            return Err(AccessError::Denied);
        }

        if !access.verification_code.matches(verification_code) {
            self.audit_access_attempt(&access, "verification failed", client_info)
                .await?;
            return Err(AccessError::Denied);
        }

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    access.requester_id.clone(),
                    AuditAction::EmergencyAccessed,
                    access.access_id.as_str(),
                )
                .details(&serde_json::json!({
                    "record": access.record_id.as_str(),
                    "ip": client_info.ip_address,
                    "user_agent": client_info.user_agent,
                }))
                .build(),
            )
            .await?;

        Ok(access)
    }

    /// Revoke an emergency grant. Immediate: further access fails.
    pub async fn revoke_emergency_access(&self, access_id: &AccessId) -> Result<EmergencyAccess> {
        let _guard = self.locks.acquire(access_id.as_str()).await;

        let access = match self
            .store
            .transition_emergency(access_id, &REVOCABLE, EmergencyStatus::Revoked)
            .await
        {
            Ok(a) => a,
            Err(StoreError::InvalidTransition { id, current }) => {
                return Err(AccessError::Conflict(format!(
                    "access {id} cannot be revoked from status {current}"
                )))
            }
            Err(StoreError::NotFound(id)) => return Err(AccessError::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        info!(access = %access.access_id, "emergency access revoked");

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    access.requester_id.clone(),
                    AuditAction::EmergencyRevoked,
                    access.access_id.as_str(),
                )
                .build(),
            )
            .await?;

        Ok(access)
    }

    /// Read-only history of emergency access for a patient.
    pub async fn emergency_access_history(
        &self,
        patient_id: &PatientId,
        requester_id: Option<&ActorId>,
    ) -> Result<Vec<EmergencyAccess>> {
        Ok(self
            .store
            .emergency_history(patient_id, requester_id)
            .await?)
    }

    /// Notify every active supervisor, best-effort.
    async fn escalate_to_supervisors(&self, access: &EmergencyAccess) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let supervisors = match self.store.actors_with_role(ActorRole::Supervisor).await {
            Ok(list) => list,
            Err(e) => {
                warn!(access = %access.access_id, error = %e, "supervisor lookup failed");
                return;
            }
        };

        let message = format!(
            "Emergency access {} ({} urgency) for patient {} awaits approval",
            access.access_id, access.urgency, access.patient_id
        );

        for supervisor in supervisors {
            match tokio::time::timeout(
                NOTIFY_TIMEOUT,
                notifier.notify(&supervisor.actor_id, &message),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(supervisor = %supervisor.actor_id, error = %e, "supervisor notification failed");
                }
                Err(_) => {
                    warn!(supervisor = %supervisor.actor_id, "supervisor notification timed out");
                }
            }
        }
    }

    async fn audit_request_failure(
        &self,
        requester_id: &ActorId,
        record_id: &RecordId,
        reason: &str,
        client_info: &ClientInfo,
    ) -> Result<()> {
        self.audit
            .log_event(
                AuditEventBuilder::new(
                    requester_id.clone(),
                    AuditAction::EmergencyRequested,
                    record_id.as_str(),
                )
                .result(AuditResult::Failure)
                .details(&serde_json::json!({
                    "reason": reason,
                    "ip": client_info.ip_address,
                    "user_agent": client_info.user_agent,
                }))
                .build(),
            )
            .await?;
        Ok(())
    }

    async fn audit_access_attempt(
        &self,
        access: &EmergencyAccess,
        reason: &str,
        client_info: &ClientInfo,
    ) -> Result<()> {
        self.audit
            .log_event(
                AuditEventBuilder::new(
                    access.requester_id.clone(),
                    AuditAction::EmergencyAccessed,
                    access.access_id.as_str(),
                )
                .result(AuditResult::Failure)
                .details(&serde_json::json!({
                    "reason": reason,
                    "ip": client_info.ip_address,
                    "user_agent": client_info.user_agent,
                }))
                .build(),
            )
            .await?;
        Ok(())
    }
}

fn pair_key(requester_id: &ActorId, patient_id: &PatientId) -> String {
    format!("{requester_id}\u{1f}{patient_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use medtrust_core::{Actor, ContentHash, Patient, RecordMeta, SigningIdentity};
    use medtrust_store::MemoryStore;

    struct RecordingNotifier {
        sent: Mutex<Vec<(ActorId, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, target: &ActorId, message: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((target.clone(), message.to_string()));
            Ok(())
        }
    }

    async fn seeded() -> (EmergencyAccessCoordinator<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditTrail::new(
            store.clone(),
            SigningIdentity::from_seed(&[5u8; 32]),
        ));
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
        });

        store
            .upsert_actor(&Actor::new(ActorId::from("dr-wren"), ActorRole::Physician))
            .await
            .unwrap();
        store
            .upsert_actor(&Actor::new(ActorId::from("sup-juno"), ActorRole::Supervisor))
            .await
            .unwrap();
        store
            .upsert_patient(&Patient::new(PatientId::from("pat-ito")))
            .await
            .unwrap();
        store
            .insert_record(&RecordMeta::new(
                RecordId::from("record-1"),
                PatientId::from("pat-ito"),
                ActorId::from("dr-wren"),
                ContentHash::hash(b"body"),
                ContentHash::hash(b"ct"),
                now_millis(),
            ))
            .await
            .unwrap();

        let coordinator =
            EmergencyAccessCoordinator::new(store, audit).with_notifier(notifier.clone());
        (coordinator, notifier)
    }

    fn client() -> ClientInfo {
        ClientInfo::new("10.0.0.9", "er-console/2.4")
    }

    #[tokio::test]
    async fn test_critical_request_auto_approves() {
        let (coordinator, _) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "unresponsive on arrival",
                &client(),
            )
            .await
            .unwrap();

        assert!(!outcome.reused);
        assert!(!outcome.access.access_id.is_empty());
        assert_eq!(outcome.access.status, EmergencyStatus::AutoApproved);
        assert!(outcome.access.expiry_time > now_millis());
    }

    #[tokio::test]
    async fn test_unknown_requester_rejected() {
        let (coordinator, _) = seeded().await;

        let err = coordinator
            .request_emergency_access(
                ActorId::from("nobody"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "test",
                &client(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid requester or insufficient permissions"
        );
    }

    #[tokio::test]
    async fn test_unknown_patient_rejected() {
        let (coordinator, _) = seeded().await;

        let err = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-unknown"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "test",
                &client(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Patient not found");
    }

    #[tokio::test]
    async fn test_duplicate_request_returns_existing() {
        let (coordinator, _) = seeded().await;

        let first = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "first",
                &client(),
            )
            .await
            .unwrap();

        let second = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "second",
                &client(),
            )
            .await
            .unwrap();

        assert!(second.reused);
        assert_eq!(second.access.access_id, first.access.access_id);
        assert!(second.message.contains("Existing"));
    }

    #[tokio::test]
    async fn test_pending_request_notifies_supervisor() {
        let (coordinator, notifier) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::High,
                "deteriorating",
                &client(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.access.status, EmergencyStatus::PendingApproval);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ActorId::from("sup-juno"));
    }

    #[tokio::test]
    async fn test_access_requires_code_and_live_status() {
        let (coordinator, _) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "unresponsive",
                &client(),
            )
            .await
            .unwrap();
        let access = outcome.access;

        // Wrong code denied, correct code allowed.
        assert!(matches!(
            coordinator
                .access_emergency_record(
                    &access.access_id,
                    &access.record_id,
                    "000000x",
                    &client(),
                )
                .await,
            Err(AccessError::Denied)
        ));
        coordinator
            .access_emergency_record(
                &access.access_id,
                &access.record_id,
                access.verification_code.as_str(),
                &client(),
            )
            .await
            .unwrap();

        // Revocation cuts access immediately.
        coordinator
            .revoke_emergency_access(&access.access_id)
            .await
            .unwrap();
        assert!(coordinator
            .access_emergency_record(
                &access.access_id,
                &access.record_id,
                access.verification_code.as_str(),
                &client(),
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_pending_access_cannot_be_used_before_approval() {
        let (coordinator, _) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Medium,
                "pain crisis",
                &client(),
            )
            .await
            .unwrap();
        let access = outcome.access;

        assert!(matches!(
            coordinator
                .access_emergency_record(
                    &access.access_id,
                    &access.record_id,
                    access.verification_code.as_str(),
                    &client(),
                )
                .await,
            Err(AccessError::Denied)
        ));

        coordinator
            .approve_emergency_access(&access.access_id, &ActorId::from("sup-juno"))
            .await
            .unwrap();
        coordinator
            .access_emergency_record(
                &access.access_id,
                &access.record_id,
                access.verification_code.as_str(),
                &client(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_supervisor_cannot_approve() {
        let (coordinator, _) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::High,
                "deteriorating",
                &client(),
            )
            .await
            .unwrap();

        let err = coordinator
            .approve_emergency_access(&outcome.access.access_id, &ActorId::from("dr-wren"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::InvalidRequester));
    }

    #[tokio::test]
    async fn test_expired_access_raises_expired_error() {
        let (coordinator, _) = seeded().await;

        let outcome = coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "unresponsive",
                &client(),
            )
            .await
            .unwrap();
        let access = outcome.access;

        // Force the expiry into the past.
        let mut lapsed = coordinator
            .store
            .get_emergency(&access.access_id)
            .await
            .unwrap()
            .unwrap();
        lapsed.expiry_time = now_millis() - 1;
        // MemoryStore has no direct row edit; re-insert under a new id to
        // simulate a lapsed grant.
        lapsed.access_id = AccessId::generate();
        coordinator.store.insert_emergency(&lapsed).await.unwrap();

        let err = coordinator
            .access_emergency_record(
                &lapsed.access_id,
                &lapsed.record_id,
                lapsed.verification_code.as_str(),
                &client(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Emergency access has expired");

        // The lapsed grant was flipped to Expired as bookkeeping.
        let stored = coordinator
            .store
            .get_emergency(&lapsed.access_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EmergencyStatus::Expired);
    }

    #[tokio::test]
    async fn test_history_is_read_only_query() {
        let (coordinator, _) = seeded().await;

        coordinator
            .request_emergency_access(
                ActorId::from("dr-wren"),
                PatientId::from("pat-ito"),
                RecordId::from("record-1"),
                UrgencyLevel::Critical,
                "unresponsive",
                &client(),
            )
            .await
            .unwrap();

        let history = coordinator
            .emergency_access_history(&PatientId::from("pat-ito"), None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        let filtered = coordinator
            .emergency_access_history(
                &PatientId::from("pat-ito"),
                Some(&ActorId::from("dr-else")),
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }
}
