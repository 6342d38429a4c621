//! # GateDB — Persistent Storage Engine
//!
//! The on-disk store for docgate, built on sled's embedded key-value store.
//! It holds both the statement catalog and every credential ever issued.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                                 | Value                     |
//! |---------------|-------------------------------------|---------------------------|
//! | `resources`   | `resource_id` (8B BE)               | `bincode(Resource)`       |
//! | `credentials` | `resource_id` (8B BE) ‖ `id` (8B BE) | `bincode(Credential)`    |
//! | `consumed`    | `credential_id` (8B BE)             | `bincode(DateTime<Utc>)`  |
//! | `status`      | `resource_id` (8B BE)               | `bincode(DeliveryStatus)` |
//! | `metadata`    | key (UTF-8)                         | counter (8B BE)           |
//!
//! Integers are stored big-endian so sled's lexicographic ordering matches
//! numeric ordering. Prefixing credential keys with the resource id groups
//! each resource's history into one contiguous range, and suffixing with the
//! credential id makes the last key in that range the most recent credential.
//!
//! ## Sequencing
//!
//! Credential ids come from `sled::Db::generate_id`, which is atomic and
//! monotonically increasing across threads and restarts (it may skip values
//! after a crash, never repeat them).
//!
//! ## Single Use
//!
//! The `consumed` tree is written with compare-and-swap from "absent", so
//! exactly one verifier wins the right to mark a credential used.
//!
//! ## Counters
//!
//! Row counts live in `metadata` and are bumped by the write that changes
//! them, so `/status` never scans a tree. A crash between a write and its
//! bump can leave a counter one short.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use super::{CredentialStore, StoreError, StoreResult};
use crate::catalog::{Location, Resource, ResourceCatalog, ResourceId};
use crate::credential::{Credential, CredentialDraft, CredentialId, DeliveryStatus};

/// Well-known keys in the `metadata` tree.
const META_RESOURCES: &str = "resources";
const META_CREDENTIALS: &str = "credentials";
const META_CONSUMED: &str = "consumed";

// ---------------------------------------------------------------------------
// Key Encoding
// ---------------------------------------------------------------------------

fn credential_key(resource_id: ResourceId, credential_id: CredentialId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&resource_id.to_be_bytes());
    key[8..].copy_from_slice(&credential_id.to_be_bytes());
    key
}

fn decode_u64(tree: &'static str, bytes: &[u8]) -> StoreResult<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| StoreError::CorruptKey {
        tree,
        expected: 8,
        got: bytes.len(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// GateDB
// ---------------------------------------------------------------------------

/// Persistent catalog and credential store.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// `GateDB` can be shared via `Arc<GateDB>` without extra locking.
#[derive(Debug, Clone)]
pub struct GateDB {
    /// The underlying sled database handle.
    db: Db,
    /// Statements indexed by id.
    resources: Tree,
    /// Credentials indexed by (resource id, credential id).
    credentials: Tree,
    /// Consumption timestamps indexed by credential id.
    consumed: Tree,
    /// Latest delivery status indexed by resource id.
    status: Tree,
    /// Row counters.
    metadata: Tree,
}

impl GateDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let resources = db.open_tree("resources")?;
        let credentials = db.open_tree("credentials")?;
        let consumed = db.open_tree("consumed")?;
        let status = db.open_tree("status")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            resources,
            credentials,
            consumed,
            status,
            metadata,
        })
    }

    // -- Resource operations ------------------------------------------------

    /// Insert or replace a resource under its own id.
    pub fn put_resource(&self, resource: &Resource) -> StoreResult<()> {
        let previous = self
            .resources
            .insert(resource.id.to_be_bytes(), encode(resource)?)?;
        if previous.is_none() {
            self.bump(META_RESOURCES, 1)?;
        }
        self.db.flush()?;
        Ok(())
    }

    /// Insert a new resource under the next free id (one past the highest).
    ///
    /// Concurrent callers race on a compare-and-swap, so two adds never
    /// claim the same id.
    pub fn add_resource(
        &self,
        title: impl Into<String>,
        date: NaiveDate,
        location: Location,
        contact: Option<String>,
    ) -> StoreResult<Resource> {
        let title = title.into();
        loop {
            let next_id = match self.resources.last()? {
                Some((key, _)) => decode_u64("resources", &key)? + 1,
                None => 1,
            };
            let resource = Resource {
                id: next_id,
                title: title.clone(),
                date,
                location: location.clone(),
                contact: contact.clone(),
            };
            let swapped = self.resources.compare_and_swap(
                next_id.to_be_bytes(),
                None::<&[u8]>,
                Some(encode(&resource)?),
            )?;
            if swapped.is_ok() {
                self.bump(META_RESOURCES, 1)?;
                self.db.flush()?;
                return Ok(resource);
            }
        }
    }

    /// Retrieve a resource by id.
    pub fn get_resource(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        match self.resources.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a resource from the catalog. Its credentials are kept; any
    /// later verification against it reports the resource as not found.
    pub fn remove_resource(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        let removed = match self.resources.remove(id.to_be_bytes())? {
            Some(bytes) => {
                self.bump(META_RESOURCES, -1)?;
                Some(decode(&bytes)?)
            }
            None => None,
        };
        self.db.flush()?;
        Ok(removed)
    }

    // -- Utility operations -------------------------------------------------

    /// Return the number of cataloged resources.
    pub fn resource_count(&self) -> usize {
        self.counter(META_RESOURCES)
    }

    /// Return the number of credentials that have been consumed.
    pub fn consumed_count(&self) -> usize {
        self.counter(META_CONSUMED)
    }

    /// Atomically adds `delta` to a `metadata` counter, saturating at zero.
    fn bump(&self, key: &str, delta: i64) -> StoreResult<()> {
        self.metadata.update_and_fetch(key, |current| {
            let value = current
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            let next = if delta.is_negative() {
                value.saturating_sub(delta.unsigned_abs())
            } else {
                value.saturating_add(delta.unsigned_abs())
            };
            Some(next.to_be_bytes().to_vec())
        })?;
        Ok(())
    }

    fn counter(&self, key: &str) -> usize {
        let read = self
            .metadata
            .get(key)
            .map_err(StoreError::from)
            .and_then(|bytes| bytes.map(|b| decode_u64("metadata", &b)).transpose());
        match read {
            Ok(value) => value.unwrap_or(0) as usize,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read counter");
                0
            }
        }
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl ResourceCatalog for GateDB {
    fn list(&self) -> StoreResult<Vec<Resource>> {
        let mut resources = Vec::new();
        for entry in self.resources.iter() {
            let (_key, value) = entry?;
            resources.push(decode(&value)?);
        }
        Ok(resources)
    }

    fn lookup(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        self.get_resource(id)
    }
}

impl CredentialStore for GateDB {
    fn append(&self, draft: CredentialDraft) -> StoreResult<Credential> {
        // generate_id starts at 0; ids start at 1 so 0 never names a credential.
        let id = self.db.generate_id()? + 1;
        let credential = Credential::from_draft(id, draft);

        self.credentials.insert(
            credential_key(credential.resource_id, id),
            encode(&credential)?,
        )?;
        self.bump(META_CREDENTIALS, 1)?;
        // Durable before the caller hands the code to a notifier.
        self.db.flush()?;

        Ok(credential)
    }

    fn latest_for(&self, resource_id: ResourceId) -> StoreResult<Option<Credential>> {
        match self
            .credentials
            .scan_prefix(resource_id.to_be_bytes())
            .next_back()
        {
            Some(entry) => {
                let (_key, value) = entry?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    fn history(&self, resource_id: ResourceId) -> StoreResult<Vec<Credential>> {
        let mut credentials = Vec::new();
        for entry in self.credentials.scan_prefix(resource_id.to_be_bytes()) {
            let (_key, value) = entry?;
            credentials.push(decode(&value)?);
        }
        Ok(credentials)
    }

    fn mark_consumed(&self, credential_id: CredentialId, at: DateTime<Utc>) -> StoreResult<bool> {
        let swapped = self.consumed.compare_and_swap(
            credential_id.to_be_bytes(),
            None::<&[u8]>,
            Some(encode(&at)?),
        )?;
        if swapped.is_ok() {
            self.bump(META_CONSUMED, 1)?;
            self.db.flush()?;
        }
        Ok(swapped.is_ok())
    }

    fn consumed_at(&self, credential_id: CredentialId) -> StoreResult<Option<DateTime<Utc>>> {
        match self.consumed.get(credential_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn record_status(&self, resource_id: ResourceId, status: DeliveryStatus) -> StoreResult<bool> {
        let key = resource_id.to_be_bytes();
        let encoded = encode(&status)?;
        loop {
            let current = self.status.get(key)?;
            if let Some(bytes) = &current {
                let existing: DeliveryStatus = decode(bytes)?;
                if !status.supersedes(&existing) {
                    return Ok(false);
                }
            }
            let swapped = self
                .status
                .compare_and_swap(key, current, Some(encoded.as_slice()))?;
            if swapped.is_ok() {
                self.db.flush()?;
                return Ok(true);
            }
        }
    }

    fn status_of(&self, resource_id: ResourceId) -> StoreResult<Option<DeliveryStatus>> {
        match self.status.get(resource_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn credential_count(&self) -> usize {
        self.counter(META_CREDENTIALS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
