//! Backend-agnostic storage abstraction for the resource tree (spec §6,
//! "Storage collaborator"), mirroring `r2e-data`'s `Repository` trait split
//! between the pure abstraction (this crate) and a concrete backend.
//!
//! The reference backend here ([`memory::InMemoryStorage`]) is the one the
//! integration tests in `cse-core` run against; a persistent backend is an
//! out-of-scope collaborator (spec §1).

pub mod error;
pub mod memory;

pub use error::StorageError;

use async_trait::async_trait;
use cse_model::{Patch, Resource, ResourceId};

/// A filter predicate used by [`Storage::search_by_filter`]. Boxed so
/// callers can build closures over captured state (e.g. "children of this
/// parent with `ty == Subscription`").
pub type FilterPredicate = Box<dyn Fn(&Resource) -> bool + Send + Sync>;

/// CRUD plus query access over the resource tree (spec §6).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create(&self, resource: Resource) -> Result<Resource, StorageError>;
    async fn retrieve(&self, ri: &str) -> Result<Resource, StorageError>;
    async fn update(&self, ri: &str, patch: &Patch) -> Result<Resource, StorageError>;
    async fn delete(&self, ri: &str) -> Result<Resource, StorageError>;

    /// Exact-match scan over a single attribute (spec §6,
    /// `searchByValueInField`). `field` names a structural field (`rn`,
    /// `pi`) or an `attrs` key.
    async fn search_by_value_in_field(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Resource>, StorageError>;

    /// Scan with a callable predicate (spec §6, `searchByFilter`).
    async fn search_by_filter(&self, predicate: FilterPredicate) -> Result<Vec<Resource>, StorageError>;

    /// Existence probe (spec §6, `hasResource`).
    async fn has_resource(&self, ri: &str) -> Result<bool, StorageError>;

    /// Convenience built on `search_by_value_in_field`: the direct children
    /// of `pi`, used by the Dispatcher's duplicate-`rn` check (spec §4.1)
    /// and cascading delete (spec §4.1, "Delete cascades to descendants").
    async fn children_of(&self, pi: &ResourceId) -> Result<Vec<Resource>, StorageError> {
        self.search_by_value_in_field("pi", &serde_json::Value::String(pi.clone())).await
    }
}
