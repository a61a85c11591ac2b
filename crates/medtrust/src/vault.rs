//! The Vault: unified API over keys, ciphers, permissions and audit.
//!
//! Every decrypt goes through exactly one of two doors: a standing
//! permission checked by the access engine, or a live emergency grant
//! checked by the coordinator. There is no third path to a data key.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::{info, warn};

use medtrust_access::{AccessControlEngine, AccessError, EmergencyAccessCoordinator};
use medtrust_audit::AuditTrail;
use medtrust_core::{
    now_millis, AccessId, ActionType, ActorId, AuditAction, AuditEventBuilder, AuditResult,
    ClientInfo, ContentHash, PatientId, RecordId, RecordMeta, SealedBatch, SigningIdentity,
};
use medtrust_crypto::{EncryptedPayload, KeyManager, MasterKeyConfig, RecordCipher};
use medtrust_store::Store;

use crate::blob::BlobStore;
use crate::config::{VaultCollaborators, VaultConfig};
use crate::error::{Result, VaultError};

/// The trust-and-access core of the platform.
///
/// Constructed once at process start with explicit dependencies and
/// shared by reference. All members are dependency-injected; nothing in
/// here reaches for a global.
pub struct Vault<S: Store> {
    service_actor: ActorId,
    seal_batch_limit: usize,
    keys: RwLock<KeyManager>,
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    audit: Arc<AuditTrail<S>>,
    access: AccessControlEngine<S>,
    emergency: EmergencyAccessCoordinator<S>,
}

impl<S: Store> Vault<S> {
    /// Create a Vault without external collaborators.
    pub fn new(
        identity: SigningIdentity,
        store: S,
        blobs: Arc<dyn BlobStore>,
        config: VaultConfig,
    ) -> Self {
        Self::with_collaborators(identity, store, blobs, config, VaultCollaborators::default())
    }

    /// Create a Vault wired to a ledger and notifier.
    pub fn with_collaborators(
        identity: SigningIdentity,
        store: S,
        blobs: Arc<dyn BlobStore>,
        config: VaultConfig,
        collaborators: VaultCollaborators,
    ) -> Self {
        let store = Arc::new(store);
        let audit = Arc::new(
            AuditTrail::new(store.clone(), identity).with_ledger(collaborators.ledger.clone()),
        );
        let access = AccessControlEngine::new(store.clone(), audit.clone())
            .with_ledger(collaborators.ledger);
        let emergency = EmergencyAccessCoordinator::new(store.clone(), audit.clone())
            .with_notifier(collaborators.notifier);

        Self {
            service_actor: config.service_actor,
            seal_batch_limit: config.seal_batch_limit,
            keys: RwLock::new(KeyManager::new(config.master_key)),
            store,
            blobs,
            audit,
            access,
            emergency,
        }
    }

    /// The access control engine (permission lifecycle).
    pub fn access(&self) -> &AccessControlEngine<S> {
        &self.access
    }

    /// The emergency access coordinator.
    pub fn emergency(&self) -> &EmergencyAccessCoordinator<S> {
        &self.emergency
    }

    /// The audit trail.
    pub fn audit(&self) -> &AuditTrail<S> {
        &self.audit
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a record: generate its data key, encrypt the body, store
    /// ciphertext and wrapped key, and grant the owner read/write.
    ///
    /// The owner's access is expressed as real permissions so that every
    /// later decrypt flows through the same choke point.
    pub async fn create_record(
        &self,
        record_id: RecordId,
        patient_id: PatientId,
        owner_id: ActorId,
        plaintext: &[u8],
    ) -> Result<RecordMeta> {
        if record_id.is_empty() || patient_id.is_empty() || owner_id.is_empty() {
            return Err(VaultError::InvalidArgument(
                "record, patient and owner ids are required".into(),
            ));
        }

        let (payload, wrapped) = {
            let keys = self.keys.read().expect("key manager lock poisoned");
            let data_key = keys.generate_data_key();
            let payload = RecordCipher::encrypt(plaintext, &data_key)?;
            let wrapped = keys.wrap_key(&data_key)?;
            (payload, wrapped)
        };

        let content_hash = RecordCipher::content_hash(plaintext);
        let payload_bytes = Bytes::from(payload.to_bytes());
        let payload_ref = ContentHash::hash(&payload_bytes);

        self.blobs
            .put(&payload_ref, payload_bytes)
            .await
            .map_err(|e| VaultError::Blob(e.to_string()))?;

        let meta = RecordMeta::new(
            record_id.clone(),
            patient_id,
            owner_id.clone(),
            content_hash,
            payload_ref,
            now_millis(),
        );
        self.store.insert_record(&meta).await?;
        self.store.put_envelope_key(&record_id, &wrapped).await?;

        for action in [ActionType::Read, ActionType::Write] {
            let requested = self
                .access
                .request(record_id.clone(), owner_id.clone(), owner_id.clone(), action)
                .await?;
            self.access.grant(&requested.permission_id, None).await?;
        }

        info!(record = %record_id, "record created");

        self.audit
            .log_event(
                AuditEventBuilder::new(owner_id, AuditAction::RecordCreated, record_id.as_str())
                    .details(&serde_json::json!({
                        "patient": meta.patient_id.as_str(),
                        "content_hash": meta.content_hash.to_hex(),
                    }))
                    .build(),
            )
            .await?;

        Ok(meta)
    }

    /// Read a record through a standing permission.
    ///
    /// The access check is the only gate; a denial never touches the data
    /// key. Denials and successes are both audited.
    pub async fn read_record(&self, record_id: &RecordId, caller: &ActorId) -> Result<Vec<u8>> {
        let allowed = self
            .access
            .check_access(record_id, caller, ActionType::Read)
            .await?;
        if !allowed {
            self.audit_record_access(caller, record_id, AuditResult::Failure, "standing")
                .await?;
            return Err(VaultError::Access(AccessError::Denied));
        }

        let meta = self.require_record(record_id).await?;
        let plaintext = self.decrypt_record(&meta).await?;

        self.audit_record_access(caller, record_id, AuditResult::Success, "standing")
            .await?;
        Ok(plaintext)
    }

    /// Read a record through a live emergency grant.
    ///
    /// The coordinator enforces status, expiry and the verification code,
    /// and audits the attempt; only then is the data key unwrapped.
    pub async fn read_record_emergency(
        &self,
        access_id: &AccessId,
        record_id: &RecordId,
        verification_code: &str,
        client_info: &ClientInfo,
    ) -> Result<Vec<u8>> {
        let access = self
            .emergency
            .access_emergency_record(access_id, record_id, verification_code, client_info)
            .await?;

        let meta = self.require_record(record_id).await?;
        let plaintext = self.decrypt_record(&meta).await?;

        self.audit_record_access(&access.requester_id, record_id, AuditResult::Success, "emergency")
            .await?;
        Ok(plaintext)
    }

    /// Replace a record body under a Write permission.
    ///
    /// The data key is reused with a fresh nonce; the metadata version is
    /// bumped and the new content hash recorded.
    pub async fn update_record(
        &self,
        record_id: &RecordId,
        caller: &ActorId,
        plaintext: &[u8],
    ) -> Result<RecordMeta> {
        let allowed = self
            .access
            .check_access(record_id, caller, ActionType::Write)
            .await?;
        if !allowed {
            return Err(VaultError::Access(AccessError::Denied));
        }

        let mut meta = self.require_record(record_id).await?;
        let wrapped = self
            .store
            .get_envelope_key(record_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("envelope key for {record_id}")))?;

        let payload = {
            let keys = self.keys.read().expect("key manager lock poisoned");
            let data_key = keys.unwrap_key(&wrapped)?;
            RecordCipher::encrypt(plaintext, &data_key)?
        };

        let payload_bytes = Bytes::from(payload.to_bytes());
        let payload_ref = ContentHash::hash(&payload_bytes);
        self.blobs
            .put(&payload_ref, payload_bytes)
            .await
            .map_err(|e| VaultError::Blob(e.to_string()))?;

        meta.replace_body(RecordCipher::content_hash(plaintext), payload_ref, now_millis());
        self.store.update_record(&meta).await?;

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    caller.clone(),
                    AuditAction::RecordUpdated,
                    record_id.as_str(),
                )
                .details(&serde_json::json!({
                    "version": meta.version,
                    "content_hash": meta.content_hash.to_hex(),
                }))
                .build(),
            )
            .await?;

        Ok(meta)
    }

    /// Compare a caller-supplied content hash against the stored one.
    pub async fn verify_record_integrity(
        &self,
        record_id: &RecordId,
        caller: &ActorId,
        provided_hash: &ContentHash,
    ) -> Result<bool> {
        let meta = self.require_record(record_id).await?;
        let matches = meta.content_hash == *provided_hash;

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    caller.clone(),
                    AuditAction::IntegrityChecked,
                    record_id.as_str(),
                )
                .result(if matches {
                    AuditResult::Success
                } else {
                    AuditResult::Failure
                })
                .build(),
            )
            .await?;

        Ok(matches)
    }

    /// Record metadata for every record of a patient.
    pub async fn records_for_patient(&self, patient_id: &PatientId) -> Result<Vec<RecordMeta>> {
        Ok(self.store.records_for_patient(patient_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Rotation
    // ─────────────────────────────────────────────────────────────────────────

    /// Rotate the master key: re-wrap every envelope key under the new
    /// configuration, then switch new wraps to it.
    ///
    /// Record bodies are untouched. Every row is unwrapped and re-wrapped
    /// before anything is written, so a corrupt row aborts the rotation
    /// with nothing changed; each row write is itself atomic.
    pub async fn rotate_master_key(&self, new_config: MasterKeyConfig) -> Result<usize> {
        let next = KeyManager::new(new_config);
        let rows = self.store.list_envelope_keys().await?;

        let rewrapped = {
            let current = self.keys.read().expect("key manager lock poisoned");
            let mut rewrapped = Vec::with_capacity(rows.len());
            for (record_id, wrapped) in &rows {
                let new_wrap = current.rewrap(wrapped, &next).map_err(|e| {
                    warn!(record = %record_id, "rotation aborted: envelope key failed to unwrap");
                    VaultError::from(e)
                })?;
                rewrapped.push((record_id.clone(), new_wrap));
            }
            rewrapped
        };

        let count = rewrapped.len();
        for (record_id, wrapped) in rewrapped {
            self.store.put_envelope_key(&record_id, &wrapped).await?;
        }

        *self.keys.write().expect("key manager lock poisoned") = next;
        info!(records = count, "master key rotated");

        self.audit
            .log_event(
                AuditEventBuilder::new(
                    self.service_actor.clone(),
                    AuditAction::KeyRotated,
                    "master-key",
                )
                .details(&serde_json::json!({ "records": count }))
                .build(),
            )
            .await?;

        Ok(count)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Sealing
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal accumulated audit events into a signed, published root.
    ///
    /// Intended for the periodic reconciliation job; returns None when
    /// nothing has accumulated.
    pub async fn seal_audit_batch(&self) -> Result<Option<SealedBatch>> {
        let Some(batch) = self.audit.seal_pending(self.seal_batch_limit).await? else {
            return Ok(None);
        };
        self.audit
            .log_seal_event(self.service_actor.clone(), &batch)
            .await?;
        Ok(Some(batch))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn require_record(&self, record_id: &RecordId) -> Result<RecordMeta> {
        self.store
            .get_record(record_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(record_id.to_string()))
    }

    /// Unwrap the record's data key and decrypt its body.
    ///
    /// Callers must have passed an authorization gate already. The
    /// decrypted bytes are checked against the stored content hash; a
    /// mismatch is tampering and returns nothing.
    async fn decrypt_record(&self, meta: &RecordMeta) -> Result<Vec<u8>> {
        let wrapped = self
            .store
            .get_envelope_key(&meta.record_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("envelope key for {}", meta.record_id)))?;

        let bytes = self
            .blobs
            .get(&meta.payload_ref)
            .await
            .map_err(|e| VaultError::Blob(e.to_string()))?
            .ok_or_else(|| VaultError::NotFound(format!("payload for {}", meta.record_id)))?;
        let payload = EncryptedPayload::from_bytes(&bytes)?;

        let plaintext = {
            let keys = self.keys.read().expect("key manager lock poisoned");
            let data_key = keys.unwrap_key(&wrapped)?;
            RecordCipher::decrypt(&payload, &data_key)?
        };

        if RecordCipher::content_hash(&plaintext) != meta.content_hash {
            return Err(VaultError::Integrity(format!(
                "content hash mismatch for {}",
                meta.record_id
            )));
        }

        Ok(plaintext)
    }

    async fn audit_record_access(
        &self,
        actor: &ActorId,
        record_id: &RecordId,
        result: AuditResult,
        path: &str,
    ) -> Result<()> {
        self.audit
            .log_event(
                AuditEventBuilder::new(
                    actor.clone(),
                    AuditAction::RecordAccessed,
                    record_id.as_str(),
                )
                .result(result)
                .details(&serde_json::json!({ "path": path }))
                .build(),
            )
            .await?;
        Ok(())
    }
}
