//! # OTP Verifier
//!
//! Checks a submitted code against the most recent credential for a
//! statement and, if it holds up, returns where the statement lives.
//!
//! ## Check order
//!
//! The checks run in a fixed order so that an input failing several of them
//! always reports the same error:
//!
//! | # | Check          | Failure                                         |
//! |---|----------------|-------------------------------------------------|
//! | 1 | existence      | `NoCredentialIssued` (`ResourceNotFound` if the id was never cataloged) |
//! | 2 | correctness    | `InvalidCredential`                             |
//! | 3 | freshness      | `CredentialExpired`                             |
//! | 4 | single use     | `CredentialConsumed`                            |
//! | 5 | resolvability  | `ResourceNotFound`                              |
//!
//! A correct code past its expiry is therefore `CredentialExpired`, and a
//! wrong code is `InvalidCredential` whether or not it would have expired.
//!
//! After step 5 the credential is marked consumed with a compare-and-swap;
//! when two submissions of the same code race, the loser gets
//! `CredentialConsumed`. The statement's delivery status then moves to
//! `downloaded`.

use std::sync::Arc;

use crate::catalog::{Location, ResourceCatalog, ResourceId};
use crate::clock::Clock;
use crate::config::{ConfigError, GateConfig};
use crate::credential::{DeliveryState, DeliveryStatus};
use crate::error::{GateError, GateResult};
use crate::storage::CredentialStore;

/// Validates submitted codes and discloses statement locations.
#[derive(Clone)]
pub struct OtpVerifier {
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl OtpVerifier {
    /// Builds a verifier. Fails if `config` does not validate.
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            catalog,
            store,
            clock,
            config,
        })
    }

    /// Verifies `submitted_code` for `resource_id` and returns its location.
    pub fn verify(&self, resource_id: ResourceId, submitted_code: &str) -> GateResult<Location> {
        let now = self.clock.now();

        let credential = match self.store.latest_for(resource_id)? {
            Some(credential) => credential,
            None => {
                if self.catalog.resolve(resource_id)?.is_none() {
                    return Err(GateError::ResourceNotFound(resource_id));
                }
                return Err(GateError::NoCredentialIssued(resource_id));
            }
        };

        if !credential.secret.matches(submitted_code) {
            tracing::debug!(resource_id, credential_id = credential.id, "code mismatch");
            return Err(GateError::InvalidCredential);
        }

        if credential.is_expired_at(now) {
            tracing::debug!(resource_id, credential_id = credential.id, "code expired");
            return Err(GateError::CredentialExpired);
        }

        if self.config.single_use && self.store.consumed_at(credential.id)?.is_some() {
            tracing::debug!(resource_id, credential_id = credential.id, "code already used");
            return Err(GateError::CredentialConsumed);
        }

        let location = self
            .catalog
            .resolve(resource_id)?
            .ok_or(GateError::ResourceNotFound(resource_id))?;

        if self.config.single_use && !self.store.mark_consumed(credential.id, now)? {
            tracing::debug!(resource_id, credential_id = credential.id, "lost consume race");
            return Err(GateError::CredentialConsumed);
        }

        let status = DeliveryStatus {
            credential_id: credential.id,
            state: DeliveryState::Downloaded,
            at: now,
        };
        if let Err(e) = self.store.record_status(resource_id, status) {
            tracing::warn!(resource_id, error = %e, "failed to record downloaded status");
        }

        tracing::info!(resource_id, credential_id = credential.id, "credential verified");
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{demo_statements, MemoryCatalog};
    use crate::clock::ManualClock;
    use crate::credential::CredentialDraft;
    use crate::otp::OtpCode;
    use crate::storage::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    struct Fixture {
        verifier: OtpVerifier,
        catalog: Arc<MemoryCatalog>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap()
    }

    fn fixture(config: GateConfig) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::with_resources(demo_statements()));
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let verifier =
            OtpVerifier::new(catalog.clone(), store.clone(), clock.clone(), config).unwrap();
        Fixture {
            verifier,
            catalog,
            store,
            clock,
        }
    }

    fn plant(store: &MemoryStore, resource_id: ResourceId, code: &str) {
        store
            .append(CredentialDraft::new(
                resource_id,
                OtpCode::from(code),
                t0(),
                chrono::Duration::minutes(5),
            ))
            .unwrap();
    }

    #[test]
    fn correct_fresh_code_returns_location() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        let location = f.verifier.verify(1, "123456").unwrap();
        assert_eq!(location.as_str(), "/files/jan2025.pdf");
    }

    #[test]
    fn success_marks_status_downloaded() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");
        f.clock.advance(chrono::Duration::minutes(2));

        f.verifier.verify(1, "123456").unwrap();
        let status = f.store.status_of(1).unwrap().expect("status recorded");
        assert_eq!(status.state, DeliveryState::Downloaded);
        assert_eq!(status.at, f.clock.now());
    }

    #[test]
    fn failed_verification_leaves_status_alone() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        assert!(f.verifier.verify(1, "000000").is_err());
        assert_eq!(f.store.status_of(1).unwrap(), None);
    }

    #[test]
    fn zero_ttl_is_refused_at_construction() {
        let result = OtpVerifier::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(t0())),
            GateConfig {
                credential_ttl: std::time::Duration::ZERO,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::ZeroTtl)));
    }

    #[test]
    fn no_credential_for_cataloged_resource() {
        let f = fixture(GateConfig::default());
        let err = f.verifier.verify(2, "123456").unwrap_err();
        assert!(matches!(err, GateError::NoCredentialIssued(2)));
    }

    #[test]
    fn uncataloged_resource_is_not_found() {
        let f = fixture(GateConfig::default());
        let err = f.verifier.verify(999, "123456").unwrap_err();
        assert!(matches!(err, GateError::ResourceNotFound(999)));
    }

    #[test]
    fn wrong_code_is_invalid_even_when_expired() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        assert!(matches!(
            f.verifier.verify(1, "654321").unwrap_err(),
            GateError::InvalidCredential
        ));
        f.clock.advance(chrono::Duration::minutes(30));
        assert!(matches!(
            f.verifier.verify(1, "654321").unwrap_err(),
            GateError::InvalidCredential
        ));
    }

    #[test]
    fn correct_code_after_expiry_is_expired() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        f.clock.advance(chrono::Duration::minutes(5) + chrono::Duration::milliseconds(1));
        assert!(matches!(
            f.verifier.verify(1, "123456").unwrap_err(),
            GateError::CredentialExpired
        ));
    }

    #[test]
    fn code_is_still_valid_at_the_expiry_instant() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        f.clock.advance(chrono::Duration::minutes(5));
        assert!(f.verifier.verify(1, "123456").is_ok());
    }

    #[test]
    fn code_is_single_use_by_default() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        assert!(f.verifier.verify(1, "123456").is_ok());
        assert!(matches!(
            f.verifier.verify(1, "123456").unwrap_err(),
            GateError::CredentialConsumed
        ));
        // A wrong code against a consumed credential is still just wrong.
        assert!(matches!(
            f.verifier.verify(1, "000000").unwrap_err(),
            GateError::InvalidCredential
        ));
    }

    #[test]
    fn replay_allowed_when_single_use_disabled() {
        let f = fixture(GateConfig {
            single_use: false,
            ..Default::default()
        });
        plant(&f.store, 1, "123456");

        assert!(f.verifier.verify(1, "123456").is_ok());
        assert!(f.verifier.verify(1, "123456").is_ok());
        assert_eq!(f.store.consumed_at(1).unwrap(), None);
    }

    #[test]
    fn removed_resource_with_valid_code_is_not_found() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 2, "123456");
        f.catalog.remove(2);

        assert!(matches!(
            f.verifier.verify(2, "123456").unwrap_err(),
            GateError::ResourceNotFound(2)
        ));
        // Resolution failed, so the code was not burned.
        assert_eq!(f.store.consumed_at(1).unwrap(), None);
    }

    #[test]
    fn newer_credential_supersedes_older() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "111111");
        plant(&f.store, 1, "222222");

        assert!(matches!(
            f.verifier.verify(1, "111111").unwrap_err(),
            GateError::InvalidCredential
        ));
        assert!(f.verifier.verify(1, "222222").is_ok());
    }

    #[test]
    fn credentials_do_not_cross_resources() {
        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "111111");

        assert!(matches!(
            f.verifier.verify(2, "111111").unwrap_err(),
            GateError::NoCredentialIssued(2)
        ));
    }

    #[test]
    fn concurrent_submissions_unlock_once() {
        use std::thread;

        let f = fixture(GateConfig::default());
        plant(&f.store, 1, "123456");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let verifier = f.verifier.clone();
                thread::spawn(move || verifier.verify(1, "123456"))
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("verifier thread should not panic"))
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, GateError::CredentialConsumed)));
    }
}
