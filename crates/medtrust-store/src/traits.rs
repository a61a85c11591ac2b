//! Store trait: the abstract interface for kernel persistence.
//!
//! This trait keeps the engines storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;

use medtrust_core::{
    AccessId, ActionType, Actor, ActorId, ActorRole, AuditEvent, ContentHash, EmergencyAccess,
    EmergencyStatus, EventId, Patient, PatientId, Permission, PermissionId, PermissionStatus,
    RecordId, RecordMeta, SealedBatch,
};
use medtrust_crypto::WrappedDataKey;

use crate::error::Result;

/// The Store trait: async interface for kernel persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
///
/// # Design Notes
///
/// - **CAS transitions**: status changes take the expected current status
///   and fail with `InvalidTransition` when it no longer holds. This is
///   what makes revoke-vs-check races safe regardless of lock discipline
///   above the store.
/// - **Active uniqueness**: `activate_permission` refuses to create a
///   second Active permission for the same `(record, grantee, action)`;
///   SQLite additionally backs this with a partial unique index.
/// - **Append-only audit**: events can be appended, read, and marked
///   sealed. There is no update or delete.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Metadata
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert metadata for a new record. Errors if the id exists.
    async fn insert_record(&self, meta: &RecordMeta) -> Result<()>;

    /// Get record metadata by id.
    async fn get_record(&self, record_id: &RecordId) -> Result<Option<RecordMeta>>;

    /// Replace record metadata (body update bookkeeping).
    async fn update_record(&self, meta: &RecordMeta) -> Result<()>;

    /// All records for a patient, ordered by creation time.
    async fn records_for_patient(&self, patient_id: &PatientId) -> Result<Vec<RecordMeta>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Envelope Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the wrapped data key for a record (insert or rotate-replace).
    async fn put_envelope_key(&self, record_id: &RecordId, wrapped: &WrappedDataKey)
        -> Result<()>;

    /// Get the wrapped data key for a record.
    async fn get_envelope_key(&self, record_id: &RecordId) -> Result<Option<WrappedDataKey>>;

    /// All envelope keys, for master-key rotation.
    async fn list_envelope_keys(&self) -> Result<Vec<(RecordId, WrappedDataKey)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new permission row. Errors if the id exists.
    async fn insert_permission(&self, permission: &Permission) -> Result<()>;

    /// Get a permission by id.
    async fn get_permission(&self, permission_id: &PermissionId) -> Result<Option<Permission>>;

    /// The Active permission for a triple, if any.
    async fn find_active_permission(
        &self,
        record_id: &RecordId,
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<Option<Permission>>;

    /// Requested -> Active, setting the expiry.
    ///
    /// Fails with `InvalidTransition` if the row is not Requested and with
    /// `UniquenessConflict` if another Active permission holds the triple.
    /// Returns the updated row.
    async fn activate_permission(
        &self,
        permission_id: &PermissionId,
        expires_at: Option<i64>,
    ) -> Result<Permission>;

    /// Compare-and-swap a permission status.
    ///
    /// Fails with `InvalidTransition` if the current status is not
    /// `expected`. Returns the updated row.
    async fn transition_permission(
        &self,
        permission_id: &PermissionId,
        expected: PermissionStatus,
        to: PermissionStatus,
    ) -> Result<Permission>;

    /// All permissions where the actor is the grantee.
    async fn permissions_for_grantee(&self, grantee_id: &ActorId) -> Result<Vec<Permission>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Emergency Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new emergency access row. Errors if the id exists.
    async fn insert_emergency(&self, access: &EmergencyAccess) -> Result<()>;

    /// Get an emergency access row by id.
    async fn get_emergency(&self, access_id: &AccessId) -> Result<Option<EmergencyAccess>>;

    /// The live (auto-approved/active, unexpired at `now`) request for a
    /// `(requester, patient)` pair, if any.
    async fn find_live_emergency(
        &self,
        requester_id: &ActorId,
        patient_id: &PatientId,
        now: i64,
    ) -> Result<Option<EmergencyAccess>>;

    /// Compare-and-swap an emergency status.
    ///
    /// `expected` lists the statuses the transition may start from. Fails
    /// with `InvalidTransition` otherwise. Returns the updated row.
    async fn transition_emergency(
        &self,
        access_id: &AccessId,
        expected: &[EmergencyStatus],
        to: EmergencyStatus,
    ) -> Result<EmergencyAccess>;

    /// Emergency history for a patient, optionally narrowed to one
    /// requester, ordered by request time.
    async fn emergency_history(
        &self,
        patient_id: &PatientId,
        requester_id: Option<&ActorId>,
    ) -> Result<Vec<EmergencyAccess>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event. Re-appending the same event id is a no-op.
    async fn append_event(&self, event: &AuditEvent) -> Result<()>;

    /// Get an event by id.
    async fn get_event(&self, event_id: &EventId) -> Result<Option<AuditEvent>>;

    /// Events touching a resource, in insertion order.
    async fn events_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEvent>>;

    /// Events not yet committed to a sealed batch, in insertion order.
    async fn unsealed_events(&self, limit: usize) -> Result<Vec<AuditEvent>>;

    /// Record a sealed batch and mark its events sealed under the root.
    async fn record_seal(&self, batch: &SealedBatch, event_ids: &[EventId]) -> Result<()>;

    /// Get a sealed batch by root.
    async fn get_seal(&self, root: &ContentHash) -> Result<Option<SealedBatch>>;

    /// The events committed under a sealed root, in insertion order.
    async fn events_for_seal(&self, root: &ContentHash) -> Result<Vec<AuditEvent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Directory
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or update an actor entry.
    async fn upsert_actor(&self, actor: &Actor) -> Result<()>;

    /// Get an actor by id.
    async fn get_actor(&self, actor_id: &ActorId) -> Result<Option<Actor>>;

    /// Active actors holding a role (e.g. supervisors for escalation).
    async fn actors_with_role(&self, role: ActorRole) -> Result<Vec<Actor>>;

    /// Insert or update a patient entry.
    async fn upsert_patient(&self, patient: &Patient) -> Result<()>;

    /// Get a patient by id.
    async fn get_patient(&self, patient_id: &PatientId) -> Result<Option<Patient>>;
}
