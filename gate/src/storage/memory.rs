//! In-memory credential store.
//!
//! Same contract as [`GateDB`](super::GateDB), nothing on disk. Each
//! resource's history lives in its own `DashMap` entry; the next id is drawn
//! while that entry's shard lock is held, so within a resource the vector is
//! always sorted by id and its last element is the most recent credential.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CredentialStore, StoreResult};
use crate::catalog::ResourceId;
use crate::credential::{Credential, CredentialDraft, CredentialId, DeliveryStatus};

#[derive(Debug, Default)]
pub struct MemoryStore {
    by_resource: DashMap<ResourceId, Vec<Credential>>,
    consumed: DashMap<CredentialId, DateTime<Utc>>,
    status: DashMap<ResourceId, DeliveryStatus>,
    last_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn append(&self, draft: CredentialDraft) -> StoreResult<Credential> {
        let mut history = self.by_resource.entry(draft.resource_id).or_default();
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let credential = Credential::from_draft(id, draft);
        history.push(credential.clone());
        Ok(credential)
    }

    fn latest_for(&self, resource_id: ResourceId) -> StoreResult<Option<Credential>> {
        Ok(self
            .by_resource
            .get(&resource_id)
            .and_then(|history| history.last().cloned()))
    }

    fn history(&self, resource_id: ResourceId) -> StoreResult<Vec<Credential>> {
        Ok(self
            .by_resource
            .get(&resource_id)
            .map(|history| history.value().clone())
            .unwrap_or_default())
    }

    fn mark_consumed(&self, credential_id: CredentialId, at: DateTime<Utc>) -> StoreResult<bool> {
        match self.consumed.entry(credential_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(at);
                Ok(true)
            }
        }
    }

    fn consumed_at(&self, credential_id: CredentialId) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.consumed.get(&credential_id).map(|at| *at))
    }

    fn record_status(&self, resource_id: ResourceId, status: DeliveryStatus) -> StoreResult<bool> {
        match self.status.entry(resource_id) {
            Entry::Occupied(mut current) => {
                if !status.supersedes(current.get()) {
                    return Ok(false);
                }
                current.insert(status);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(status);
                Ok(true)
            }
        }
    }

    fn status_of(&self, resource_id: ResourceId) -> StoreResult<Option<DeliveryStatus>> {
        Ok(self.status.get(&resource_id).map(|s| *s))
    }

    fn credential_count(&self) -> usize {
        self.by_resource.iter().map(|entry| entry.value().len()).sum()
    }
}
