//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the medtrust kernel. It uses
//! rusqlite with bundled SQLite behind a connection mutex; compare-and-swap
//! transitions run inside immediate transactions so a racing revoke and
//! check serialize at the database.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use medtrust_core::{
    AccessId, ActionType, Actor, ActorId, ActorRole, AuditAction, AuditEvent, AuditResult,
    ContentHash, EmergencyAccess, EmergencyStatus, EventId, Patient, PatientId, Permission,
    PermissionId, PermissionStatus, RecordId, RecordMeta, RootSignature, SealedBatch,
    VerificationCode,
};
use medtrust_crypto::WrappedDataKey;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Store;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            StoreError::InvalidData(format!("connection mutex poisoned: {e}"))
        })?;
        f(&conn)
    }

    /// Execute a blocking operation that needs mutable access.
    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| {
            StoreError::InvalidData(format!("connection mutex poisoned: {e}"))
        })?;
        f(&mut conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row conversion helpers
// ─────────────────────────────────────────────────────────────────────────

fn conversion_err(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn hash32(bytes: Vec<u8>, idx: usize) -> rusqlite::Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| conversion_err(idx, Type::Blob, "expected 32-byte blob".into()))
}

fn sig64(bytes: Vec<u8>, idx: usize) -> rusqlite::Result<[u8; 64]> {
    bytes
        .try_into()
        .map_err(|_| conversion_err(idx, Type::Blob, "expected 64-byte blob".into()))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordMeta> {
    Ok(RecordMeta {
        record_id: RecordId::from(row.get::<_, String>("record_id")?),
        patient_id: PatientId::from(row.get::<_, String>("patient_id")?),
        owner_id: ActorId::from(row.get::<_, String>("owner_id")?),
        content_hash: ContentHash::from_bytes(hash32(row.get("content_hash")?, 3)?),
        payload_ref: ContentHash::from_bytes(hash32(row.get("payload_ref")?, 4)?),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        version: row.get("version")?,
    })
}

fn row_to_permission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Permission> {
    let action: String = row.get("action_type")?;
    let status: String = row.get("status")?;
    Ok(Permission {
        permission_id: PermissionId::from(row.get::<_, String>("permission_id")?),
        record_id: RecordId::from(row.get::<_, String>("record_id")?),
        grantee_id: ActorId::from(row.get::<_, String>("grantee_id")?),
        grantor_id: ActorId::from(row.get::<_, String>("grantor_id")?),
        action: action
            .parse::<ActionType>()
            .map_err(|e| conversion_err(4, Type::Text, e))?,
        status: status
            .parse::<PermissionStatus>()
            .map_err(|e| conversion_err(5, Type::Text, e))?,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
    })
}

fn row_to_emergency(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmergencyAccess> {
    let status: String = row.get("status")?;
    let urgency: String = row.get("urgency_level")?;
    Ok(EmergencyAccess {
        access_id: AccessId::from(row.get::<_, String>("access_id")?),
        requester_id: ActorId::from(row.get::<_, String>("requester_id")?),
        patient_id: PatientId::from(row.get::<_, String>("patient_id")?),
        record_id: RecordId::from(row.get::<_, String>("record_id")?),
        status: status
            .parse::<EmergencyStatus>()
            .map_err(|e| conversion_err(4, Type::Text, e))?,
        urgency: urgency
            .parse()
            .map_err(|e: String| conversion_err(5, Type::Text, e))?,
        verification_code: VerificationCode::from_string(
            row.get::<_, String>("verification_code")?,
        ),
        justification: row.get("justification")?,
        request_time: row.get("request_time")?,
        expiry_time: row.get("expiry_time")?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let action: u16 = row.get("action")?;
    let result: u8 = row.get("result")?;
    Ok(AuditEvent {
        event_id: EventId::from_bytes(hash32(row.get("event_id")?, 0)?),
        actor_id: ActorId::from(row.get::<_, String>("actor_id")?),
        action: AuditAction::from_u16(action)
            .ok_or_else(|| conversion_err(2, Type::Integer, format!("bad action {action}")))?,
        resource_id: row.get("resource_id")?,
        result: AuditResult::from_u8(result)
            .ok_or_else(|| conversion_err(4, Type::Integer, format!("bad result {result}")))?,
        timestamp: row.get("timestamp")?,
        details_hash: ContentHash::from_bytes(hash32(row.get("details_hash")?, 6)?),
    })
}

fn row_to_actor(row: &rusqlite::Row<'_>) -> rusqlite::Result<Actor> {
    let role: String = row.get("role")?;
    Ok(Actor {
        actor_id: ActorId::from(row.get::<_, String>("actor_id")?),
        role: role
            .parse::<ActorRole>()
            .map_err(|e| conversion_err(1, Type::Text, e))?,
        active: row.get("active")?,
    })
}

fn fetch_permission(conn: &Connection, id: &PermissionId) -> Result<Option<Permission>> {
    Ok(conn
        .query_row(
            "SELECT * FROM permissions WHERE permission_id = ?1",
            params![id.as_str()],
            row_to_permission,
        )
        .optional()?)
}

fn fetch_emergency(conn: &Connection, id: &AccessId) -> Result<Option<EmergencyAccess>> {
    Ok(conn
        .query_row(
            "SELECT * FROM emergency_access WHERE access_id = ?1",
            params![id.as_str()],
            row_to_emergency,
        )
        .optional()?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_record(&self, meta: &RecordMeta) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO records
                    (record_id, patient_id, owner_id, content_hash, payload_ref,
                     created_at, updated_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    meta.record_id.as_str(),
                    meta.patient_id.as_str(),
                    meta.owner_id.as_str(),
                    meta.content_hash.as_bytes().as_slice(),
                    meta.payload_ref.as_bytes().as_slice(),
                    meta.created_at,
                    meta.updated_at,
                    meta.version,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(meta.record_id.to_string()));
            }
            Ok(())
        })
    }

    async fn get_record(&self, record_id: &RecordId) -> Result<Option<RecordMeta>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM records WHERE record_id = ?1",
                    params![record_id.as_str()],
                    row_to_record,
                )
                .optional()?)
        })
    }

    async fn update_record(&self, meta: &RecordMeta) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE records
                    SET content_hash = ?2, payload_ref = ?3, updated_at = ?4, version = ?5
                  WHERE record_id = ?1",
                params![
                    meta.record_id.as_str(),
                    meta.content_hash.as_bytes().as_slice(),
                    meta.payload_ref.as_bytes().as_slice(),
                    meta.updated_at,
                    meta.version,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(meta.record_id.to_string()));
            }
            Ok(())
        })
    }

    async fn records_for_patient(&self, patient_id: &PatientId) -> Result<Vec<RecordMeta>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM records WHERE patient_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![patient_id.as_str()], row_to_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn put_envelope_key(
        &self,
        record_id: &RecordId,
        wrapped: &WrappedDataKey,
    ) -> Result<()> {
        let json = serde_json::to_string(wrapped)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO envelope_keys (record_id, encrypted_data_key, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_id) DO UPDATE
                    SET encrypted_data_key = ?2, updated_at = ?3",
                params![record_id.as_str(), json, medtrust_core::now_millis()],
            )?;
            Ok(())
        })
    }

    async fn get_envelope_key(&self, record_id: &RecordId) -> Result<Option<WrappedDataKey>> {
        let json: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT encrypted_data_key FROM envelope_keys WHERE record_id = ?1",
                    params![record_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        json.map(|j| {
            serde_json::from_str(&j).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn list_envelope_keys(&self) -> Result<Vec<(RecordId, WrappedDataKey)>> {
        let rows: Vec<(String, String)> = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT record_id, encrypted_data_key FROM envelope_keys")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;

        rows.into_iter()
            .map(|(id, json)| {
                let wrapped = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok((RecordId::from(id), wrapped))
            })
            .collect()
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO permissions
                    (permission_id, record_id, grantee_id, grantor_id, action_type,
                     status, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    permission.permission_id.as_str(),
                    permission.record_id.as_str(),
                    permission.grantee_id.as_str(),
                    permission.grantor_id.as_str(),
                    permission.action.as_str(),
                    permission.status.as_str(),
                    permission.created_at,
                    permission.expires_at,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(
                    permission.permission_id.to_string(),
                ));
            }
            Ok(())
        })
    }

    async fn get_permission(&self, permission_id: &PermissionId) -> Result<Option<Permission>> {
        self.with_conn(|conn| fetch_permission(conn, permission_id))
    }

    async fn find_active_permission(
        &self,
        record_id: &RecordId,
        grantee_id: &ActorId,
        action: ActionType,
    ) -> Result<Option<Permission>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM permissions
                      WHERE record_id = ?1 AND grantee_id = ?2 AND action_type = ?3
                        AND status = 'active'",
                    params![record_id.as_str(), grantee_id.as_str(), action.as_str()],
                    row_to_permission,
                )
                .optional()?)
        })
    }

    async fn activate_permission(
        &self,
        permission_id: &PermissionId,
        expires_at: Option<i64>,
    ) -> Result<Permission> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let current = tx
                .query_row(
                    "SELECT * FROM permissions WHERE permission_id = ?1",
                    params![permission_id.as_str()],
                    row_to_permission,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(permission_id.to_string()))?;

            if current.status != PermissionStatus::Requested {
                return Err(StoreError::InvalidTransition {
                    id: permission_id.to_string(),
                    current: current.status.to_string(),
                });
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT permission_id FROM permissions
                      WHERE record_id = ?1 AND grantee_id = ?2 AND action_type = ?3
                        AND status = 'active'",
                    params![
                        current.record_id.as_str(),
                        current.grantee_id.as_str(),
                        current.action.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Err(StoreError::UniquenessConflict { existing });
            }

            tx.execute(
                "UPDATE permissions SET status = 'active', expires_at = ?2
                  WHERE permission_id = ?1",
                params![permission_id.as_str(), expires_at],
            )?;
            tx.commit()?;

            let mut updated = current;
            updated.status = PermissionStatus::Active;
            updated.expires_at = expires_at;
            Ok(updated)
        })
    }

    async fn transition_permission(
        &self,
        permission_id: &PermissionId,
        expected: PermissionStatus,
        to: PermissionStatus,
    ) -> Result<Permission> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let current = tx
                .query_row(
                    "SELECT * FROM permissions WHERE permission_id = ?1",
                    params![permission_id.as_str()],
                    row_to_permission,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(permission_id.to_string()))?;

            if current.status != expected {
                return Err(StoreError::InvalidTransition {
                    id: permission_id.to_string(),
                    current: current.status.to_string(),
                });
            }

            tx.execute(
                "UPDATE permissions SET status = ?2 WHERE permission_id = ?1",
                params![permission_id.as_str(), to.as_str()],
            )?;
            tx.commit()?;

            let mut updated = current;
            updated.status = to;
            Ok(updated)
        })
    }

    async fn permissions_for_grantee(&self, grantee_id: &ActorId) -> Result<Vec<Permission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM permissions WHERE grantee_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![grantee_id.as_str()], row_to_permission)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn insert_emergency(&self, access: &EmergencyAccess) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO emergency_access
                    (access_id, requester_id, patient_id, record_id, status,
                     urgency_level, verification_code, justification,
                     request_time, expiry_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    access.access_id.as_str(),
                    access.requester_id.as_str(),
                    access.patient_id.as_str(),
                    access.record_id.as_str(),
                    access.status.as_str(),
                    access.urgency.as_str(),
                    access.verification_code.as_str(),
                    access.justification,
                    access.request_time,
                    access.expiry_time,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(access.access_id.to_string()));
            }
            Ok(())
        })
    }

    async fn get_emergency(&self, access_id: &AccessId) -> Result<Option<EmergencyAccess>> {
        self.with_conn(|conn| fetch_emergency(conn, access_id))
    }

    async fn find_live_emergency(
        &self,
        requester_id: &ActorId,
        patient_id: &PatientId,
        now: i64,
    ) -> Result<Option<EmergencyAccess>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM emergency_access
                      WHERE requester_id = ?1 AND patient_id = ?2
                        AND status IN ('auto-approved', 'active')
                        AND expiry_time > ?3
                      ORDER BY request_time DESC LIMIT 1",
                    params![requester_id.as_str(), patient_id.as_str(), now],
                    row_to_emergency,
                )
                .optional()?)
        })
    }

    async fn transition_emergency(
        &self,
        access_id: &AccessId,
        expected: &[EmergencyStatus],
        to: EmergencyStatus,
    ) -> Result<EmergencyAccess> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let current = tx
                .query_row(
                    "SELECT * FROM emergency_access WHERE access_id = ?1",
                    params![access_id.as_str()],
                    row_to_emergency,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(access_id.to_string()))?;

            if !expected.contains(&current.status) {
                return Err(StoreError::InvalidTransition {
                    id: access_id.to_string(),
                    current: current.status.to_string(),
                });
            }

            tx.execute(
                "UPDATE emergency_access SET status = ?2 WHERE access_id = ?1",
                params![access_id.as_str(), to.as_str()],
            )?;
            tx.commit()?;

            let mut updated = current;
            updated.status = to;
            Ok(updated)
        })
    }

    async fn emergency_history(
        &self,
        patient_id: &PatientId,
        requester_id: Option<&ActorId>,
    ) -> Result<Vec<EmergencyAccess>> {
        self.with_conn(|conn| match requester_id {
            Some(requester) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM emergency_access
                      WHERE patient_id = ?1 AND requester_id = ?2
                      ORDER BY request_time",
                )?;
                let rows = stmt.query_map(
                    params![patient_id.as_str(), requester.as_str()],
                    row_to_emergency,
                )?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM emergency_access WHERE patient_id = ?1 ORDER BY request_time",
                )?;
                let rows = stmt.query_map(params![patient_id.as_str()], row_to_emergency)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        })
    }

    async fn append_event(&self, event: &AuditEvent) -> Result<()> {
        self.with_conn(|conn| {
            // INSERT OR IGNORE keeps re-appends of the same content
            // address idempotent without an update path.
            conn.execute(
                "INSERT OR IGNORE INTO audit_events
                    (event_id, actor_id, action, resource_id, result, timestamp, details_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_id.as_bytes().as_slice(),
                    event.actor_id.as_str(),
                    event.action.to_u16(),
                    event.resource_id,
                    event.result.to_u8(),
                    event.timestamp,
                    event.details_hash.as_bytes().as_slice(),
                ],
            )?;
            Ok(())
        })
    }

    async fn get_event(&self, event_id: &EventId) -> Result<Option<AuditEvent>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM audit_events WHERE event_id = ?1",
                    params![event_id.as_bytes().as_slice()],
                    row_to_event,
                )
                .optional()?)
        })
    }

    async fn events_for_resource(&self, resource_id: &str) -> Result<Vec<AuditEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_events WHERE resource_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt.query_map(params![resource_id], row_to_event)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn unsealed_events(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_events WHERE sealed_root IS NULL ORDER BY seq LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_event)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn record_seal(&self, batch: &SealedBatch, event_ids: &[EventId]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO audit_seals (root, signature, event_count, sealed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    batch.root.as_bytes().as_slice(),
                    batch.signature.as_bytes().as_slice(),
                    batch.event_count,
                    batch.sealed_at,
                ],
            )?;

            {
                let mut stmt = tx.prepare(
                    "UPDATE audit_events SET sealed_root = ?1 WHERE event_id = ?2",
                )?;
                for id in event_ids {
                    stmt.execute(params![
                        batch.root.as_bytes().as_slice(),
                        id.as_bytes().as_slice()
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    async fn get_seal(&self, root: &ContentHash) -> Result<Option<SealedBatch>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT root, signature, event_count, sealed_at
                       FROM audit_seals WHERE root = ?1",
                    params![root.as_bytes().as_slice()],
                    |row| {
                        Ok(SealedBatch {
                            root: ContentHash::from_bytes(hash32(row.get(0)?, 0)?),
                            signature: RootSignature::from_bytes(sig64(row.get(1)?, 1)?),
                            event_count: row.get(2)?,
                            sealed_at: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    async fn events_for_seal(&self, root: &ContentHash) -> Result<Vec<AuditEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_events WHERE sealed_root = ?1 ORDER BY seq",
            )?;
            let rows = stmt.query_map(params![root.as_bytes().as_slice()], row_to_event)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn upsert_actor(&self, actor: &Actor) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO actors (actor_id, role, active) VALUES (?1, ?2, ?3)
                 ON CONFLICT(actor_id) DO UPDATE SET role = ?2, active = ?3",
                params![actor.actor_id.as_str(), actor.role.as_str(), actor.active],
            )?;
            Ok(())
        })
    }

    async fn get_actor(&self, actor_id: &ActorId) -> Result<Option<Actor>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM actors WHERE actor_id = ?1",
                    params![actor_id.as_str()],
                    row_to_actor,
                )
                .optional()?)
        })
    }

    async fn actors_with_role(&self, role: ActorRole) -> Result<Vec<Actor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM actors WHERE role = ?1 AND active = 1 ORDER BY actor_id",
            )?;
            let rows = stmt.query_map(params![role.as_str()], row_to_actor)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    async fn upsert_patient(&self, patient: &Patient) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO patients (patient_id, active) VALUES (?1, ?2)
                 ON CONFLICT(patient_id) DO UPDATE SET active = ?2",
                params![patient.patient_id.as_str(), patient.active],
            )?;
            Ok(())
        })
    }

    async fn get_patient(&self, patient_id: &PatientId) -> Result<Option<Patient>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM patients WHERE patient_id = ?1",
                    params![patient_id.as_str()],
                    |row| {
                        Ok(Patient {
                            patient_id: PatientId::from(row.get::<_, String>("patient_id")?),
                            active: row.get("active")?,
                        })
                    },
                )
                .optional()?)
        })
    }
}
