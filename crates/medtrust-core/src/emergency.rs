//! Emergency access: time-bound, urgency-gated overrides of standing
//! permissions.
//!
//! State machine:
//! `Requested -> {AutoApproved | PendingApproval} -> Active -> {Expired | Revoked}`.
//!
//! AutoApproved is live immediately (it reads as Active); PendingApproval
//! needs a supervisor before it does. Expiry is fixed at approval time and
//! never extended implicitly.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{AccessId, ActorId, PatientId, RecordId};

/// How urgent the clinical situation is claimed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    /// Routine override request.
    Low,
    /// Elevated, non-life-threatening.
    Medium,
    /// Serious, time-sensitive.
    High,
    /// Life-threatening. Auto-approves.
    Critical,
}

impl UrgencyLevel {
    /// Time-to-live for an approved grant at this urgency.
    pub fn ttl_millis(&self) -> i64 {
        match self {
            UrgencyLevel::Critical => 60 * 60 * 1000,
            UrgencyLevel::High => 30 * 60 * 1000,
            UrgencyLevel::Medium | UrgencyLevel::Low => 15 * 60 * 1000,
        }
    }

    /// Whether a request at this urgency activates without a supervisor.
    pub fn auto_approves(&self) -> bool {
        matches!(self, UrgencyLevel::Critical)
    }

    /// Stable text form, matching the persisted column.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrgencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(UrgencyLevel::Low),
            "medium" => Ok(UrgencyLevel::Medium),
            "high" => Ok(UrgencyLevel::High),
            "critical" => Ok(UrgencyLevel::Critical),
            other => Err(format!("unknown urgency level: {other}")),
        }
    }
}

/// Lifecycle status of an emergency access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmergencyStatus {
    /// Created, not yet routed.
    Requested,
    /// Approved by policy without a supervisor. Live.
    AutoApproved,
    /// Waiting on a supervisor.
    PendingApproval,
    /// Approved by a supervisor. Live.
    Active,
    /// Lapsed past its expiry. Terminal.
    Expired,
    /// Terminated. Terminal.
    Revoked,
}

impl EmergencyStatus {
    /// True for the two live states.
    pub fn is_live(&self) -> bool {
        matches!(self, EmergencyStatus::AutoApproved | EmergencyStatus::Active)
    }

    /// Stable text form, matching the persisted column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Requested => "requested",
            EmergencyStatus::AutoApproved => "auto-approved",
            EmergencyStatus::PendingApproval => "pending-approval",
            EmergencyStatus::Active => "active",
            EmergencyStatus::Expired => "expired",
            EmergencyStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmergencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(EmergencyStatus::Requested),
            "auto-approved" => Ok(EmergencyStatus::AutoApproved),
            "pending-approval" => Ok(EmergencyStatus::PendingApproval),
            "active" => Ok(EmergencyStatus::Active),
            "expired" => Ok(EmergencyStatus::Expired),
            "revoked" => Ok(EmergencyStatus::Revoked),
            other => Err(format!("unknown emergency status: {other}")),
        }
    }
}

/// A short numeric code the requester must present when using the grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Number of decimal digits in a code.
    pub const DIGITS: usize = 6;

    /// Generate a fresh code from the process CSPRNG.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{n:06}"))
    }

    /// Wrap a persisted code.
    pub fn from_string(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-shape comparison with a supplied code.
    pub fn matches(&self, supplied: &str) -> bool {
        self.0 == supplied
    }
}

impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Codes gate access; keep them out of debug output.
        write!(f, "VerificationCode(******)")
    }
}

/// An emergency access request and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyAccess {
    /// Unique id of this request.
    pub access_id: AccessId,

    /// The clinician requesting the override.
    pub requester_id: ActorId,

    /// The patient whose records are being reached.
    pub patient_id: PatientId,

    /// The specific record requested.
    pub record_id: RecordId,

    /// Claimed urgency; drives TTL and auto-approval.
    pub urgency: UrgencyLevel,

    /// Current lifecycle status.
    pub status: EmergencyStatus,

    /// Code the requester must present at access time.
    pub verification_code: VerificationCode,

    /// Free-text clinical justification, supplied at request time.
    pub justification: String,

    /// When the request was made (Unix ms).
    pub request_time: i64,

    /// When the grant lapses (Unix ms). Fixed at approval, never extended.
    pub expiry_time: i64,
}

impl EmergencyAccess {
    /// Create a new request. Auto-approval policy is applied immediately;
    /// the expiry clock starts now either way.
    pub fn request(
        requester_id: ActorId,
        patient_id: PatientId,
        record_id: RecordId,
        urgency: UrgencyLevel,
        justification: impl Into<String>,
        now: i64,
    ) -> Self {
        let status = if urgency.auto_approves() {
            EmergencyStatus::AutoApproved
        } else {
            EmergencyStatus::PendingApproval
        };

        Self {
            access_id: AccessId::generate(),
            requester_id,
            patient_id,
            record_id,
            urgency,
            status,
            verification_code: VerificationCode::generate(),
            justification: justification.into(),
            request_time: now,
            expiry_time: now + urgency.ttl_millis(),
        }
    }

    /// True if the grant is live and unexpired at `now`.
    pub fn is_usable(&self, now: i64) -> bool {
        self.status.is_live() && now < self.expiry_time
    }

    /// True if live but past expiry, i.e. due for bookkeeping.
    pub fn is_lapsed(&self, now: i64) -> bool {
        self.status.is_live() && now >= self.expiry_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(urgency: UrgencyLevel) -> EmergencyAccess {
        EmergencyAccess::request(
            ActorId::from("dr-wren"),
            PatientId::from("pat-ito"),
            RecordId::from("record-1"),
            urgency,
            "unresponsive on arrival",
            1_000_000,
        )
    }

    #[test]
    fn test_critical_auto_approves() {
        let access = request(UrgencyLevel::Critical);
        assert_eq!(access.status, EmergencyStatus::AutoApproved);
        assert!(access.is_usable(1_000_001));
        assert_eq!(access.expiry_time, 1_000_000 + 60 * 60 * 1000);
    }

    #[test]
    fn test_high_requires_supervisor() {
        let access = request(UrgencyLevel::High);
        assert_eq!(access.status, EmergencyStatus::PendingApproval);
        assert!(!access.is_usable(1_000_001));
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let access = request(UrgencyLevel::Critical);
        assert!(access.is_usable(access.expiry_time - 1));
        assert!(!access.is_usable(access.expiry_time));
        assert!(access.is_lapsed(access.expiry_time));
    }

    #[test]
    fn test_verification_code_shape() {
        let code = VerificationCode::generate();
        assert_eq!(code.as_str().len(), VerificationCode::DIGITS);
        assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
        assert!(code.matches(code.as_str()));
        assert!(!code.matches("not-a-code"));
    }

    #[test]
    fn test_code_hidden_from_debug() {
        let code = VerificationCode::from_string("123456");
        assert!(!format!("{code:?}").contains("123456"));
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(UrgencyLevel::Critical > UrgencyLevel::High);
        assert!(UrgencyLevel::High > UrgencyLevel::Medium);
    }
}
