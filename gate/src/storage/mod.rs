//! # Storage Module
//!
//! Credential persistence. The issuer appends, the verifier reads the latest
//! entry for a resource and marks it consumed. Nothing is ever deleted.
//! Alongside the credentials each resource carries a delivery status
//! (`sent`, then `downloaded`).
//!
//! ## Architecture
//!
//! ```text
//! mod.rs    — CredentialStore trait and the shared error type
//! db.rs     — GateDB: sled-backed store + catalog, survives restarts
//! memory.rs — MemoryStore: DashMap-backed store for tests and embedding
//! ```
//!
//! ## Ordering
//!
//! Every credential gets an id from a strictly increasing sequence at
//! append time. "Most recent credential for resource X" means "highest id
//! for X", never "latest `issued_at`", so two appends in the same
//! millisecond still have a well-defined winner.

pub mod db;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::catalog::ResourceId;
use crate::credential::{Credential, CredentialDraft, CredentialId, DeliveryStatus};

pub use db::GateDB;
pub use memory::MemoryStore;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt key in tree `{tree}`: expected {expected} bytes, got {got}")]
    CorruptKey {
        tree: &'static str,
        expected: usize,
        got: usize,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only credential persistence.
pub trait CredentialStore: Send + Sync {
    /// Assigns the next id to `draft` and persists it.
    fn append(&self, draft: CredentialDraft) -> StoreResult<Credential>;

    /// The credential with the highest id for `resource_id`.
    fn latest_for(&self, resource_id: ResourceId) -> StoreResult<Option<Credential>>;

    /// All credentials ever issued for `resource_id`, oldest first.
    fn history(&self, resource_id: ResourceId) -> StoreResult<Vec<Credential>>;

    /// Records that `credential_id` unlocked its resource at `at`.
    ///
    /// Returns `true` for exactly one caller per credential; every later (or
    /// concurrently losing) call returns `false` and leaves the first
    /// timestamp in place.
    fn mark_consumed(&self, credential_id: CredentialId, at: DateTime<Utc>) -> StoreResult<bool>;

    /// When `credential_id` was consumed, if it has been.
    fn consumed_at(&self, credential_id: CredentialId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Records `status` for `resource_id` if it
    /// [supersedes](DeliveryStatus::supersedes) the current one. Returns
    /// whether it was stored.
    fn record_status(&self, resource_id: ResourceId, status: DeliveryStatus) -> StoreResult<bool>;

    /// The current delivery status of `resource_id`.
    fn status_of(&self, resource_id: ResourceId) -> StoreResult<Option<DeliveryStatus>>;

    /// Total number of credentials across all resources.
    fn credential_count(&self) -> usize;
}
