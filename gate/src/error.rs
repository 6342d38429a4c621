//! Error taxonomy for the access flow.
//!
//! Every failure a caller can see is one of the variants below. They are all
//! local and recoverable: the caller fixes its input (or asks for a new code)
//! and tries again. [`GateError::code`] gives a stable machine-readable tag
//! so transports can report the category without leaking internal detail.

use thiserror::Error;

use crate::catalog::ResourceId;
use crate::storage::StoreError;

/// Errors returned by [`OtpIssuer`](crate::issuer::OtpIssuer) and
/// [`OtpVerifier`](crate::verifier::OtpVerifier).
#[derive(Debug, Error)]
pub enum GateError {
    /// The resource is unknown, or was removed from the catalog after a
    /// credential was issued for it.
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    /// Verification was attempted before any code was issued.
    #[error("no credential has been issued for resource {0}")]
    NoCredentialIssued(ResourceId),

    /// The submitted code does not match the latest credential.
    #[error("invalid credential")]
    InvalidCredential,

    /// The code matched but its lifetime has passed.
    #[error("credential expired")]
    CredentialExpired,

    /// The code matched and is fresh, but it has already unlocked the resource.
    #[error("credential already used")]
    CredentialConsumed,

    /// The requester contact was empty.
    #[error("invalid contact: {0}")]
    InvalidContact(String),

    /// A batch send named no resources.
    #[error("batch names no resources")]
    EmptyBatch,

    /// Delivery of a code failed. Soft: logged by the issuer, never returned
    /// from issuance.
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Stable snake_case tag for this error's category.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::ResourceNotFound(_) => "resource_not_found",
            GateError::NoCredentialIssued(_) => "no_credential_issued",
            GateError::InvalidCredential => "invalid_credential",
            GateError::CredentialExpired => "credential_expired",
            GateError::CredentialConsumed => "credential_consumed",
            GateError::InvalidContact(_) => "invalid_contact",
            GateError::EmptyBatch => "empty_batch",
            GateError::NotificationFailed(_) => "notification_failed",
            GateError::Storage(_) => "internal_error",
        }
    }

    /// A fixed, caller-safe description. Unlike `Display`, never includes
    /// ids or store internals.
    pub fn public_message(&self) -> &'static str {
        match self {
            GateError::ResourceNotFound(_) => "Statement not found",
            GateError::NoCredentialIssued(_) => "No OTP found",
            GateError::InvalidCredential => "Invalid OTP",
            GateError::CredentialExpired => "OTP expired",
            GateError::CredentialConsumed => "OTP already used",
            GateError::InvalidContact(_) => "A contact address is required",
            GateError::EmptyBatch => "No statement IDs",
            GateError::NotificationFailed(_) => "Could not deliver OTP",
            GateError::Storage(_) => "Internal error",
        }
    }

    /// Whether the caller can correct this by changing its request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GateError::Storage(_) | GateError::NotificationFailed(_))
    }
}
