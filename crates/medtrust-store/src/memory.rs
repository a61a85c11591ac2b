//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Thread-safe via
//! RwLock.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use medtrust_core::{
    AccessId, ActionType, Actor, ActorId, ActorRole, AuditEvent, ContentHash, EmergencyAccess,
    EmergencyStatus, EventId, Patient, PatientId, Permission, PermissionId, PermissionStatus,
    RecordId, RecordMeta, SealedBatch,
};
use medtrust_crypto::WrappedDataKey;

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Record metadata by id.
    records: HashMap<RecordId, RecordMeta>,

    /// Wrapped data keys by record id.
    envelope_keys: HashMap<RecordId, WrappedDataKey>,

    /// Permissions by id.
    permissions: HashMap<PermissionId, Permission>,

    /// Uniqueness index: (record, grantee, action) -> the Active permission.
    active_index: HashMap<(RecordId, ActorId, ActionType), PermissionId>,

    /// Emergency access rows by id.
    emergency: HashMap<AccessId, EmergencyAccess>,

    /// Audit events in insertion order.
    events: Vec<AuditEvent>,

    /// Position index for events.
    event_index: HashMap<EventId, usize>,

    /// Event -> sealed root.
    sealed: HashMap<EventId, ContentHash>,

    /// Sealed batches by root, with their event ids in order.
    seals: HashMap<ContentHash, (SealedBatch, Vec<EventId>)>,

    /// Actor directory.
    actors: HashMap<ActorId, Actor>,

    /// Patient directory.
    patients: HashMap<PatientId, Patient>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().expect("store lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_record(&self, meta: &RecordMeta) -> Result<()> {
        let mut inner = self.write();
        if inner.records.contains_key(&meta.record_id) {
            return Err(StoreError::AlreadyExists(meta.record_id.to_string()));
        }
        inner.records.insert(meta.record_id.clone(), meta.clone());
        Ok(())
    }

    async fn get_record(&self, record_id: &RecordId) -> Result<Option<RecordMeta>> {
        Ok(self.read().records.get(record_id).cloned())
    }

    async fn update_record(&self, meta: &RecordMeta) -> Result<()> {
        let mut inner = self.write();
        if !inner.records.contains_key(&meta.record_id) {
            return Err(StoreError::NotFound(meta.record_id.to_string()));
        }
        inner.records.insert(meta.record_id.clone(), meta.clone());
        Ok(())
    }

    async fn records_for_patient(&self, patient_id: &PatientId) -> Result<Vec<RecordMeta>> {
        let inner = self.read();
        let mut records: Vec<RecordMeta> = inner
            .records
            .values()
            .filter(|m| &m.patient_id == patient_id)
            .cloned()
            .collect();
        records.sort_by_key(|m| m.created_at);
        Ok(records)
    }

    async fn put_envelope_key(
        &self,
        record_id: &RecordId,
        wrapped: &WrappedDataKey,
    ) -> Result<()> {
        self.write()
            .envelope_keys
            .insert(record_id.clone(), wrapped.clone());
        Ok(())
    }

    async fn get_envelope_key(&self, record_id: &RecordId) -> Result<Option<WrappedDataKey>> {
        Ok(self.read().envelope_keys.get(record_id).cloned())
    }

    async fn list_envelope_keys(&self) -> Result<Vec<(RecordId, WrappedDataKey)>> {
        Ok(self
            .read()
            .envelope_keys
            .iter()
            .map(|(id, key)| (id.clone(), key.clone()))
            .collect())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<()> {
        let mut inner = self.write();
        if inner.permissions.contains_key(&permission.permission_id) {
            return Err(StoreError::AlreadyExists(
                permission.permission_id.to_string(),
            ));
        }
        if permission.status == PermissionStatus::Active {
            let key = (
                permission.record_id.clone(),
                permission.grantee_id.clone(),
                permission.action,
            );
            if let Some(existing) = inner.active_index.get(&key) {
                return Err(StoreError::UniquenessConflict {
                    existing: existing.to_string(),
                });
            }
            inner
                .active_index
                .insert(key, permission.permission_id.clone());
        }
        inner
            .permissions
            .insert(permission.permission_id.clone(), permission.clone());
        Ok(())
    }

    async fn get_permission(&self, permission_id: &PermissionId) -> Result<Option<Permission>> {
        Ok(self.read().permissions.get(permission_id).cloned())
    }

    async fn find_active_permission(
        &self,
        record_id: &RecordId,
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<Option<Permission>> {
        let inner = self.read();
        let key = (record_id.clone(), grantee_id.clone(), action);
        Ok(inner
            .active_index
            .get(&key)
            .and_then(|id| inner.permissions.get(id))
            .cloned())
    }

    async fn activate_permission(
        &self,
        permission_id: &PermissionId,
        expires_at: Option<i64>,
    ) -> Result<Permission> {
        let mut inner = self.write();

        let current = inner
            .permissions
            .get(permission_id)
            .ok_or_else(|| StoreError::NotFound(permission_id.to_string()))?
            .clone();

        if current.status != PermissionStatus::Requested {
            return Err(StoreError::InvalidTransition {
                id: permission_id.to_string(),
                current: current.status.to_string(),
            });
        }

        let key = (
            current.record_id.clone(),
            current.grantee_id.clone(),
            current.action,
        );
        if let Some(existing) = inner.active_index.get(&key) {
            return Err(StoreError::UniquenessConflict {
                existing: existing.to_string(),
            });
        }

        let mut updated = current;
        updated.status = PermissionStatus::Active;
        updated.expires_at = expires_at;

        inner.active_index.insert(key, permission_id.clone());
        inner
            .permissions
            .insert(permission_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn transition_permission(
        &self,
        permission_id: &PermissionId,
        expected: PermissionStatus,
        to: PermissionStatus,
    ) -> Result<Permission> {
        let mut inner = self.write();

        let current = inner
            .permissions
            .get(permission_id)
            .ok_or_else(|| StoreError::NotFound(permission_id.to_string()))?
            .clone();

        if current.status != expected {
            return Err(StoreError::InvalidTransition {
                id: permission_id.to_string(),
                current: current.status.to_string(),
            });
        }

        let mut updated = current;
        updated.status = to;

        // Leaving Active frees the uniqueness slot.
        if expected == PermissionStatus::Active && to != PermissionStatus::Active {
            let key = (
                updated.record_id.clone(),
                updated.grantee_id.clone(),
                updated.action,
            );
            inner.active_index.remove(&key);
        }

        inner
            .permissions
            .insert(permission_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn permissions_for_grantee(&self, grantee_id: &ActorId) -> Result<Vec<Permission>> {
        let inner = self.read();
        let mut permissions: Vec<Permission> = inner
            .permissions
            .values()
            .filter(|p| &p.grantee_id == grantee_id)
            .cloned()
            .collect();
        permissions.sort_by_key(|p| p.created_at);
        Ok(permissions)
    }

    async fn insert_emergency(&self, access: &EmergencyAccess) -> Result<()> {
        let mut inner = self.write();
        if inner.emergency.contains_key(&access.access_id) {
            return Err(StoreError::AlreadyExists(access.access_id.to_string()));
        }
        inner
            .emergency
            .insert(access.access_id.clone(), access.clone());
        Ok(())
    }

    async fn get_emergency(&self, access_id: &AccessId) -> Result<Option<EmergencyAccess>> {
        Ok(self.read().emergency.get(access_id).cloned())
    }

    async fn find_live_emergency(
        &self,
        requester_id: &ActorId,
        patient_id: &PatientId,
        now: i64,
    ) -> Result<Option<EmergencyAccess>> {
        let inner = self.read();
        Ok(inner
            .emergency
            .values()
            .filter(|a| {
                &a.requester_id == requester_id
                    && &a.patient_id == patient_id
                    && a.is_usable(now)
            })
            .max_by_key(|a| a.request_time)
            .cloned())
    }

    async fn transition_emergency(
        &self,
        access_id: &AccessId,
        expected: &[EmergencyStatus],
        to: EmergencyStatus,
    ) -> Result<EmergencyAccess> {
        let mut inner = self.write();

        let current = inner
            .emergency
            .get(access_id)
            .ok_or_else(|| StoreError::NotFound(access_id.to_string()))?
            .clone();

        if !expected.contains(&current.status) {
            return Err(StoreError::InvalidTransition {
                id: access_id.to_string(),
                current: current.status.to_string(),
            });
        }

        let mut updated = current;
        updated.status = to;
        inner
            .emergency
            .insert(access_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn emergency_history(
        &self,
        patient_id: &PatientId,
        requester_id: Option<&ActorId>,
    ) -> Result<Vec<EmergencyAccess>> {
        let inner = self.read();
        let mut history: Vec<EmergencyAccess> = inner
            .emergency
            .values()
            .filter(|a| &a.patient_id == patient_id)
            .filter(|a| requester_id.map(|r| &a.requester_id == r).unwrap_or(true))
            .cloned()
            .collect();
        history.sort_by_key(|a| a.request_time);
        Ok(history)
    }

    async fn append_event(&self, event: &AuditEvent) -> Result<()> {
        let mut inner = self.write();
        if inner.event_index.contains_key(&event.event_id) {
            return Ok(());
        }
        let position = inner.events.len();
        inner.events.push(event.clone());
        inner.event_index.insert(event.event_id, position);
        Ok(())
    }

    async fn get_event(&self, event_id: &EventId) -> Result<Option<AuditEvent>> {
        let inner = self.read();
        Ok(inner
            .event_index
            .get(event_id)
            .map(|&pos| inner.events[pos].clone()))
    }

    async fn events_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn unsealed_events(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let inner = self.read();
        Ok(inner
            .events
            .iter()
            .filter(|e| !inner.sealed.contains_key(&e.event_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_seal(&self, batch: &SealedBatch, event_ids: &[EventId]) -> Result<()> {
        let mut inner = self.write();
        for id in event_ids {
            inner.sealed.insert(*id, batch.root);
        }
        inner
            .seals
            .insert(batch.root, (batch.clone(), event_ids.to_vec()));
        Ok(())
    }

    async fn get_seal(&self, root: &ContentHash) -> Result<Option<SealedBatch>> {
        Ok(self.read().seals.get(root).map(|(batch, _)| batch.clone()))
    }

    async fn events_for_seal(&self, root: &ContentHash) -> Result<Vec<AuditEvent>> {
        let inner = self.read();
        let Some((_, ids)) = inner.seals.get(root) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.event_index.get(id))
            .map(|&pos| inner.events[pos].clone())
            .collect())
    }

    async fn upsert_actor(&self, actor: &Actor) -> Result<()> {
        self.write()
            .actors
            .insert(actor.actor_id.clone(), actor.clone());
        Ok(())
    }

    async fn get_actor(&self, actor_id: &ActorId) -> Result<Option<Actor>> {
        Ok(self.read().actors.get(actor_id).cloned())
    }

    async fn actors_with_role(&self, role: ActorRole) -> Result<Vec<Actor>> {
        let mut actors: Vec<Actor> = self
            .read()
            .actors
            .values()
            .filter(|a| a.role == role && a.active)
            .cloned()
            .collect();
        actors.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
        Ok(actors)
    }

    async fn upsert_patient(&self, patient: &Patient) -> Result<()> {
        self.write()
            .patients
            .insert(patient.patient_id.clone(), patient.clone());
        Ok(())
    }

    async fn get_patient(&self, patient_id: &PatientId) -> Result<Option<Patient>> {
        Ok(self.read().patients.get(patient_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medtrust_core::now_millis;

    fn sample_permission() -> Permission {
        Permission::request(
            RecordId::from("record-1"),
            ActorId::from("dr-osei"),
            ActorId::from("dr-wren"),
            ActionType::Read,
            now_millis(),
        )
    }

    #[tokio::test]
    async fn test_permission_activate_and_uniqueness() {
        let store = MemoryStore::new();

        let first = sample_permission();
        store.insert_permission(&first).await.unwrap();
        let activated = store
            .activate_permission(&first.permission_id, None)
            .await
            .unwrap();
        assert_eq!(activated.status, PermissionStatus::Active);

        // Second request for the same triple can be inserted but not
        // activated while the first holds the slot.
        let mut second = sample_permission();
        second.permission_id = PermissionId::generate();
        store.insert_permission(&second).await.unwrap();
        let err = store
            .activate_permission(&second.permission_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniquenessConflict { .. }));

        // Revoking the first frees the slot.
        store
            .transition_permission(
                &first.permission_id,
                PermissionStatus::Active,
                PermissionStatus::Revoked,
            )
            .await
            .unwrap();
        store
            .activate_permission(&second.permission_id, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transition_cas_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let permission = sample_permission();
        store.insert_permission(&permission).await.unwrap();

        let err = store
            .transition_permission(
                &permission.permission_id,
                PermissionStatus::Active,
                PermissionStatus::Revoked,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_append_event_is_idempotent() {
        let store = MemoryStore::new();
        let event = medtrust_core::AuditEventBuilder::new(
            ActorId::from("dr-wren"),
            medtrust_core::AuditAction::RecordCreated,
            "record-1",
        )
        .build();

        store.append_event(&event).await.unwrap();
        store.append_event(&event).await.unwrap();
        assert_eq!(store.unsealed_events(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_live_emergency_ignores_expired() {
        let store = MemoryStore::new();
        let now = now_millis();
        let access = EmergencyAccess::request(
            ActorId::from("dr-wren"),
            PatientId::from("pat-ito"),
            RecordId::from("record-1"),
            medtrust_core::UrgencyLevel::Critical,
            "unresponsive",
            now,
        );
        store.insert_emergency(&access).await.unwrap();

        let found = store
            .find_live_emergency(&access.requester_id, &access.patient_id, now + 1)
            .await
            .unwrap();
        assert_eq!(found.as_ref().map(|a| &a.access_id), Some(&access.access_id));

        let past_expiry = store
            .find_live_emergency(&access.requester_id, &access.patient_id, access.expiry_time)
            .await
            .unwrap();
        assert!(past_expiry.is_none());
    }
}
