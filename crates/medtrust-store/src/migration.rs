//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use medtrust_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::info!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Record metadata. Plaintext never lands here; only its hash and
        -- the blob store address of the ciphertext.
        CREATE TABLE records (
            record_id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            content_hash BLOB NOT NULL,      -- 32 bytes, blake3 of plaintext
            payload_ref BLOB NOT NULL,       -- 32 bytes, blob store address
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            version INTEGER NOT NULL
        );

        CREATE INDEX idx_records_patient ON records(patient_id, created_at);

        -- One wrapped data key per record. Rotation replaces the row.
        CREATE TABLE envelope_keys (
            record_id TEXT PRIMARY KEY,
            encrypted_data_key TEXT NOT NULL, -- JSON {algorithm, keyId, iv, authTag, ciphertext}
            updated_at INTEGER NOT NULL
        );

        -- Standing permissions.
        CREATE TABLE permissions (
            permission_id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            grantee_id TEXT NOT NULL,
            grantor_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER
        );

        -- At most one Active permission per (record, grantee, action).
        CREATE UNIQUE INDEX idx_permissions_active
            ON permissions(record_id, grantee_id, action_type)
            WHERE status = 'active';

        CREATE INDEX idx_permissions_grantee ON permissions(grantee_id, created_at);

        -- Emergency access requests.
        CREATE TABLE emergency_access (
            access_id TEXT PRIMARY KEY,
            requester_id TEXT NOT NULL,
            patient_id TEXT NOT NULL,
            record_id TEXT NOT NULL,
            status TEXT NOT NULL,
            urgency_level TEXT NOT NULL,
            verification_code TEXT NOT NULL,
            justification TEXT NOT NULL,
            request_time INTEGER NOT NULL,
            expiry_time INTEGER NOT NULL
        );

        CREATE INDEX idx_emergency_pair ON emergency_access(requester_id, patient_id);
        CREATE INDEX idx_emergency_patient ON emergency_access(patient_id, request_time);

        -- Append-only audit log. seq preserves insertion order; there is
        -- no UPDATE or DELETE path apart from seal bookkeeping.
        CREATE TABLE audit_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id BLOB NOT NULL UNIQUE,   -- 32 bytes, blake3 content address
            actor_id TEXT NOT NULL,
            action INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            result INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            details_hash BLOB NOT NULL,      -- 32 bytes
            sealed_root BLOB                 -- 32 bytes once sealed
        );

        CREATE INDEX idx_audit_resource ON audit_events(resource_id, seq);
        CREATE INDEX idx_audit_sealed ON audit_events(sealed_root);

        -- Sealed batch roots and their signatures.
        CREATE TABLE audit_seals (
            root BLOB PRIMARY KEY,           -- 32 bytes
            signature BLOB NOT NULL,         -- 64 bytes, Ed25519 over root
            event_count INTEGER NOT NULL,
            sealed_at INTEGER NOT NULL
        );

        -- Actor and patient directory.
        CREATE TABLE actors (
            actor_id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            active INTEGER NOT NULL
        );

        CREATE TABLE patients (
            patient_id TEXT PRIMARY KEY,
            active INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}
