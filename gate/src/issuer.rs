//! # OTP Issuer
//!
//! Mints a credential for a statement, persists it, then hands the code to
//! the notifier without waiting for the result.
//!
//! ## Ordering
//!
//! 1. The statement must resolve in the catalog.
//! 2. The credential is appended to the store (and flushed).
//! 3. The statement's delivery status becomes `sent`.
//! 4. Delivery is spawned on the Tokio runtime.
//!
//! Step 2 always completes before step 4 starts, so a requester can never
//! receive a code the store does not know about. Steps 3 and 4 failing never
//! undo step 2.
//!
//! ## Batches
//!
//! [`OtpIssuer::issue_many`] runs the same steps for several statements at
//! once, sending each code to the contact registered on the statement.
//! Statements with no contact, or no longer cataloged, are reported and
//! skipped; they do not fail the batch.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{Resource, ResourceCatalog, ResourceId};
use crate::clock::Clock;
use crate::config::{ConfigError, GateConfig};
use crate::credential::{CredentialDraft, CredentialHandle, DeliveryState, DeliveryStatus};
use crate::error::{GateError, GateResult};
use crate::notify::{Delivery, Notifier};
use crate::otp::OtpCode;
use crate::storage::CredentialStore;

/// Result of one entry in a batch send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// A credential was stored and its delivery spawned.
    Issued(CredentialHandle),
    /// The statement has no registered contact; nothing was stored.
    NoContact { resource_id: ResourceId },
    /// The id is not cataloged.
    NotFound { resource_id: ResourceId },
}

impl BatchOutcome {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            BatchOutcome::Issued(handle) => handle.resource_id,
            BatchOutcome::NoContact { resource_id } | BatchOutcome::NotFound { resource_id } => {
                *resource_id
            }
        }
    }
}

/// Creates and dispatches one-time credentials.
#[derive(Clone)]
pub struct OtpIssuer {
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl OtpIssuer {
    /// Builds an issuer. Fails if `config` does not validate.
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Result<Self, ConfigError> {
        let ttl = config.ttl()?;
        Ok(Self {
            catalog,
            store,
            notifier,
            clock,
            ttl,
        })
    }

    /// Issues a fresh credential for `resource_id` and sends its code to
    /// `contact`.
    ///
    /// Any earlier credential for the same resource stops being accepted the
    /// moment this one is stored. The returned handle carries no secret.
    ///
    /// Delivery runs on the current Tokio runtime. Called outside one, the
    /// credential is still stored and the missed delivery is logged.
    pub fn issue(&self, resource_id: ResourceId, contact: &str) -> GateResult<CredentialHandle> {
        let contact = contact.trim();
        if contact.is_empty() {
            return Err(GateError::InvalidContact("contact is empty".into()));
        }

        let resource = match self.catalog.lookup(resource_id)? {
            Some(resource) => resource,
            None => {
                tracing::debug!(resource_id, "issuance refused: resource not cataloged");
                return Err(GateError::ResourceNotFound(resource_id));
            }
        };

        self.mint(&resource, contact)
    }

    /// Issues one credential per id in `resource_ids`, each sent to the
    /// contact registered on that statement.
    ///
    /// Duplicate ids are issued once, at their first position. A storage
    /// error stops the batch; credentials already stored stay stored.
    pub fn issue_many(&self, resource_ids: &[ResourceId]) -> GateResult<Vec<BatchOutcome>> {
        if resource_ids.is_empty() {
            return Err(GateError::EmptyBatch);
        }

        let mut outcomes: Vec<BatchOutcome> = Vec::with_capacity(resource_ids.len());
        for &resource_id in resource_ids {
            if outcomes.iter().any(|o| o.resource_id() == resource_id) {
                continue;
            }

            let outcome = match self.catalog.lookup(resource_id)? {
                None => BatchOutcome::NotFound { resource_id },
                Some(resource) => match resource.contact.as_deref().map(str::trim) {
                    Some(contact) if !contact.is_empty() => {
                        BatchOutcome::Issued(self.mint(&resource, contact)?)
                    }
                    _ => {
                        tracing::debug!(resource_id, "batch entry skipped: no contact");
                        BatchOutcome::NoContact { resource_id }
                    }
                },
            };
            outcomes.push(outcome);
        }

        let issued = outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Issued(_)))
            .count();
        tracing::info!(requested = resource_ids.len(), issued, "batch issued");
        Ok(outcomes)
    }

    fn mint(&self, resource: &Resource, contact: &str) -> GateResult<CredentialHandle> {
        let resource_id = resource.id;
        let now = self.clock.now();
        let draft = CredentialDraft::new(resource_id, OtpCode::generate(), now, self.ttl);
        let credential = self.store.append(draft)?;

        tracing::info!(
            resource_id,
            credential_id = credential.id,
            expires_at = %credential.expires_at.to_rfc3339(),
            "credential issued"
        );

        let status = DeliveryStatus {
            credential_id: credential.id,
            state: DeliveryState::Sent,
            at: now,
        };
        if let Err(e) = self.store.record_status(resource_id, status) {
            tracing::warn!(resource_id, error = %e, "failed to record sent status");
        }

        self.dispatch(Delivery {
            contact: contact.to_string(),
            resource_id,
            title: resource.title.clone(),
            secret: credential.secret.clone(),
            expires_at: credential.expires_at,
        });

        Ok(credential.handle())
    }

    /// Fire-and-forget delivery. Failures are logged as
    /// [`GateError::NotificationFailed`] and go no further.
    fn dispatch(&self, delivery: Delivery) {
        let resource_id = delivery.resource_id;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let err = GateError::NotificationFailed(e.to_string());
                tracing::warn!(resource_id, error = %err, "no runtime for delivery");
                return;
            }
        };

        let notifier = Arc::clone(&self.notifier);
        runtime.spawn(async move {
            if let Err(e) = notifier.send(delivery).await {
                let err = GateError::NotificationFailed(e.to_string());
                tracing::warn!(resource_id, error = %err, "code delivery failed");
            }
        });
    }
}
