//! Standing permissions and their lifecycle.
//!
//! A permission moves through `Requested -> Active -> {Revoked | Expired}`.
//! At most one Active permission may exist per
//! `(record_id, grantee_id, action)`; the store enforces that invariant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{ActorId, PermissionId, RecordId};

/// What a permission allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Decrypt and read the record.
    Read,
    /// Replace the record body.
    Write,
    /// Grant further read access.
    Share,
    /// Destroy the record.
    Delete,
}

impl ActionType {
    /// All actions, in a stable order.
    pub const ALL: [ActionType; 4] = [
        ActionType::Read,
        ActionType::Write,
        ActionType::Share,
        ActionType::Delete,
    ];

    /// Stable text form, matching the persisted column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Read => "read",
            ActionType::Write => "write",
            ActionType::Share => "share",
            ActionType::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(ActionType::Read),
            "write" => Ok(ActionType::Write),
            "share" => Ok(ActionType::Share),
            "delete" => Ok(ActionType::Delete),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

/// Lifecycle status of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    /// Created, awaiting grantor approval.
    Requested,
    /// Live; grants access until revoked or expired.
    Active,
    /// Terminated by the grantor. Terminal.
    Revoked,
    /// Lapsed past its expiry. Terminal.
    Expired,
}

impl PermissionStatus {
    /// Stable text form, matching the persisted column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionStatus::Requested => "requested",
            PermissionStatus::Active => "active",
            PermissionStatus::Revoked => "revoked",
            PermissionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(PermissionStatus::Requested),
            "active" => Ok(PermissionStatus::Active),
            "revoked" => Ok(PermissionStatus::Revoked),
            "expired" => Ok(PermissionStatus::Expired),
            other => Err(format!("unknown permission status: {other}")),
        }
    }
}

/// A standing access grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique id of this permission.
    pub permission_id: PermissionId,

    /// The record access applies to.
    pub record_id: RecordId,

    /// Who receives access.
    pub grantee_id: ActorId,

    /// Who granted (or will grant) it.
    pub grantor_id: ActorId,

    /// What is allowed.
    pub action: ActionType,

    /// Current lifecycle status.
    pub status: PermissionStatus,

    /// When the permission was created (Unix ms).
    pub created_at: i64,

    /// Optional expiry (Unix ms). None means no expiry.
    pub expires_at: Option<i64>,
}

impl Permission {
    /// Create a new permission in the Requested state.
    pub fn request(
        record_id: RecordId,
        grantee_id: ActorId,
        grantor_id: ActorId,
        action: ActionType,
        now: i64,
    ) -> Self {
        Self {
            permission_id: PermissionId::generate(),
            record_id,
            grantee_id,
            grantor_id,
            action,
            status: PermissionStatus::Requested,
            created_at: now,
            expires_at: None,
        }
    }

    /// True if this permission authorizes access at `now`.
    ///
    /// Lazy expiry: an Active permission past its expiry denies without
    /// waiting for a status sweep.
    pub fn is_valid(&self, now: i64) -> bool {
        if self.status != PermissionStatus::Active {
            return false;
        }
        match self.expires_at {
            Some(expires) => now < expires,
            None => true,
        }
    }

    /// True if Active but past expiry, i.e. due for bookkeeping.
    pub fn is_lapsed(&self, now: i64) -> bool {
        self.status == PermissionStatus::Active
            && self.expires_at.map(|e| now >= e).unwrap_or(false)
    }

    /// True if this permission covers the given triple.
    pub fn matches(&self, record_id: &RecordId, grantee_id: &ActorId, action: ActionType) -> bool {
        &self.record_id == record_id && &self.grantee_id == grantee_id && self.action == action
    }
}
