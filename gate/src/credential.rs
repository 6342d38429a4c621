//! Issued credentials.
//!
//! A [`Credential`] is written once by the issuer and never mutated. Whether
//! it is still usable is a function of three things held elsewhere: a newer
//! credential for the same resource, the clock, and the consumed table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ResourceId;
use crate::otp::OtpCode;

/// Monotonic id assigned by the credential store.
pub type CredentialId = u64;

/// Everything about a credential except its id. The store turns a draft
/// into a [`Credential`] by assigning the next sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDraft {
    pub resource_id: ResourceId,
    pub secret: OtpCode,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CredentialDraft {
    /// A draft issued at `now` that expires `ttl` later.
    pub fn new(
        resource_id: ResourceId,
        secret: OtpCode,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            resource_id,
            secret,
            issued_at: now,
            expires_at: now + ttl,
        }
    }
}

/// A persisted one-time credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub resource_id: ResourceId,
    pub secret: OtpCode,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn from_draft(id: CredentialId, draft: CredentialDraft) -> Self {
        Self {
            id,
            resource_id: draft.resource_id,
            secret: draft.secret,
            issued_at: draft.issued_at,
            expires_at: draft.expires_at,
        }
    }

    /// Expired strictly after `expires_at`; the boundary instant is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The caller-safe acknowledgement for this credential.
    pub fn handle(&self) -> CredentialHandle {
        CredentialHandle {
            credential_id: self.id,
            resource_id: self.resource_id,
            expires_at: self.expires_at,
        }
    }
}

/// Acknowledgement returned by issuance. Deliberately carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHandle {
    pub credential_id: CredentialId,
    pub resource_id: ResourceId,
    pub expires_at: DateTime<Utc>,
}

/// Where a statement's latest code is in its life: mailed, or used to
/// download the statement. Ordered so `Downloaded` outranks `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Downloaded,
}

/// Per-statement delivery status, tied to the credential that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub credential_id: CredentialId,
    pub state: DeliveryState,
    pub at: DateTime<Utc>,
}

impl DeliveryStatus {
    /// Whether `self` should replace `current`. A status for an older
    /// credential never overwrites one for a newer credential, and for the
    /// same credential the state only moves forward.
    pub fn supersedes(&self, current: &DeliveryStatus) -> bool {
        (self.credential_id, self.state) > (current.credential_id, current.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn draft_sets_expiry_from_ttl() {
        let draft = CredentialDraft::new(1, OtpCode::from("111111"), t0(), chrono::Duration::minutes(5));
        assert_eq!(draft.expires_at - draft.issued_at, chrono::Duration::minutes(5));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let draft = CredentialDraft::new(1, OtpCode::from("111111"), t0(), chrono::Duration::minutes(5));
        let credential = Credential::from_draft(7, draft);

        assert!(!credential.is_expired_at(t0()));
        assert!(!credential.is_expired_at(credential.expires_at));
        assert!(credential.is_expired_at(credential.expires_at + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn handle_omits_secret() {
        let draft = CredentialDraft::new(3, OtpCode::from("987654"), t0(), chrono::Duration::minutes(5));
        let credential = Credential::from_draft(42, draft);
        let handle = credential.handle();

        assert_eq!(handle.credential_id, 42);
        assert_eq!(handle.resource_id, 3);
        let rendered = format!("{:?}", handle);
        assert!(!rendered.contains("987654"));
    }

    #[test]
    fn credential_survives_bincode() {
        let draft = CredentialDraft::new(3, OtpCode::from("000042"), t0(), chrono::Duration::minutes(5));
        let credential = Credential::from_draft(1, draft);
        let bytes = bincode::serialize(&credential).unwrap();
        let back: Credential = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, credential);
    }

    #[test]
    fn delivery_status_only_moves_forward() {
        let sent = |credential_id| DeliveryStatus {
            credential_id,
            state: DeliveryState::Sent,
            at: t0(),
        };
        let downloaded = |credential_id| DeliveryStatus {
            credential_id,
            state: DeliveryState::Downloaded,
            at: t0(),
        };

        assert!(downloaded(4).supersedes(&sent(4)));
        assert!(!sent(4).supersedes(&downloaded(4)));
        assert!(sent(5).supersedes(&downloaded(4)));
        assert!(!downloaded(4).supersedes(&sent(5)));
        assert!(!sent(4).supersedes(&sent(4)));
    }
}
