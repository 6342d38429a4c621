//! # Resource Catalog
//!
//! The registry of protected statements. The access flow only ever reads it:
//! the issuer checks a statement exists before minting a code, and the
//! verifier resolves the statement's location after a code checks out.
//!
//! Two implementations ship with the crate: [`GateDB`](crate::storage::GateDB)
//! persists resources alongside credentials, and [`MemoryCatalog`] keeps them
//! in a map for tests and embedded use.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::storage::StoreResult;

/// Identifier of a protected resource.
pub type ResourceId = u64;

/// Where a resource can be fetched from: a path, URI or object key.
/// Opaque to the access flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A protected statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub date: NaiveDate,
    pub location: Location,
    /// Registered address for batch sends. Resources without one are
    /// skipped by [`OtpIssuer::issue_many`](crate::issuer::OtpIssuer::issue_many).
    pub contact: Option<String>,
}

/// Read side of the catalog, as consumed by the issuer and verifier.
pub trait ResourceCatalog: Send + Sync {
    /// Every resource, ordered by id.
    fn list(&self) -> StoreResult<Vec<Resource>>;

    /// The full record for `id`, or `None` if it is not (or no longer)
    /// cataloged.
    fn lookup(&self, id: ResourceId) -> StoreResult<Option<Resource>>;

    /// The location of `id`, or `None` if it is not (or no longer) cataloged.
    fn resolve(&self, id: ResourceId) -> StoreResult<Option<Location>> {
        Ok(self.lookup(id)?.map(|r| r.location))
    }
}

/// In-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    resources: RwLock<BTreeMap<ResourceId, Resource>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog pre-populated with `resources`.
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            catalog.insert(resource);
        }
        catalog
    }

    /// Inserts or replaces a resource.
    pub fn insert(&self, resource: Resource) {
        self.resources.write().insert(resource.id, resource);
    }

    /// Removes a resource, returning it if it was present.
    pub fn remove(&self, id: ResourceId) -> Option<Resource> {
        self.resources.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl ResourceCatalog for MemoryCatalog {
    fn list(&self) -> StoreResult<Vec<Resource>> {
        Ok(self.resources.read().values().cloned().collect())
    }

    fn lookup(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        Ok(self.resources.read().get(&id).cloned())
    }
}

/// The two statements the demo deployment ships with.
pub fn demo_statements() -> Vec<Resource> {
    vec![
        Resource {
            id: 1,
            title: "January 2025 Statement".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap_or_default(),
            location: Location::new("/files/jan2025.pdf"),
            contact: None,
        },
        Resource {
            id: 2,
            title: "February 2025 Statement".into(),
            date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap_or_default(),
            location: Location::new("/files/feb2025.pdf"),
            contact: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_returns_location_for_known_id() {
        let catalog = MemoryCatalog::with_resources(demo_statements());
        assert_eq!(
            catalog.resolve(1).unwrap(),
            Some(Location::new("/files/jan2025.pdf"))
        );
        assert_eq!(catalog.resolve(999).unwrap(), None);
    }

    #[test]
    fn list_is_ordered_by_id() {
        let mut statements = demo_statements();
        statements.reverse();
        let catalog = MemoryCatalog::with_resources(statements);

        let ids: Vec<_> = catalog.list().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn removed_resource_no_longer_resolves() {
        let catalog = MemoryCatalog::with_resources(demo_statements());
        let removed = catalog.remove(2).expect("statement 2 present");
        assert_eq!(removed.title, "February 2025 Statement");
        assert_eq!(catalog.resolve(2).unwrap(), None);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.remove(2).is_none());
    }

    #[test]
    fn lookup_returns_full_record() {
        let mut statement = demo_statements().remove(0);
        statement.contact = Some("patient@example.com".into());
        let catalog = MemoryCatalog::with_resources([statement.clone()]);

        assert_eq!(catalog.lookup(1).unwrap(), Some(statement));
        assert_eq!(catalog.lookup(2).unwrap(), None);
    }

    #[test]
    fn demo_dates_are_real_month_ends() {
        let statements = demo_statements();
        assert_eq!(statements[0].date.to_string(), "2025-01-31");
        assert_eq!(statements[1].date.to_string(), "2025-02-28");
    }
}
