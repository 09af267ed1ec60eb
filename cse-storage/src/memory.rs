//! In-memory reference [`Storage`] backend, backed by a `DashMap` keyed by
//! `ri`. This is the backend the `cse-core` integration tests run against
//! (spec §8); a durable backend is an out-of-scope collaborator (spec §1).

use crate::{FilterPredicate, Storage, StorageError};
use async_trait::async_trait;
use cse_model::{apply_patch, Patch, Resource, ResourceId};
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryStorage {
    resources: DashMap<ResourceId, Resource>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage { resources: DashMap::new() }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create(&self, resource: Resource) -> Result<Resource, StorageError> {
        if self.resources.contains_key(&resource.ri) {
            return Err(StorageError::Conflict(format!("resource {} already exists", resource.ri)));
        }
        self.resources.insert(resource.ri.clone(), resource.clone());
        Ok(resource)
    }

    async fn retrieve(&self, ri: &str) -> Result<Resource, StorageError> {
        self.resources
            .get(ri)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(ri.to_string()))
    }

    async fn update(&self, ri: &str, patch: &Patch) -> Result<Resource, StorageError> {
        let mut entry = self
            .resources
            .get_mut(ri)
            .ok_or_else(|| StorageError::NotFound(ri.to_string()))?;
        apply_patch(&mut entry, patch);
        Ok(entry.value().clone())
    }

    async fn delete(&self, ri: &str) -> Result<Resource, StorageError> {
        self.resources
            .remove(ri)
            .map(|(_, resource)| resource)
            .ok_or_else(|| StorageError::NotFound(ri.to_string()))
    }

    async fn search_by_value_in_field(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Resource>, StorageError> {
        let matches = self
            .resources
            .iter()
            .filter(|entry| entry.value().get(field).as_ref() == Some(value))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(matches)
    }

    async fn search_by_filter(&self, predicate: FilterPredicate) -> Result<Vec<Resource>, StorageError> {
        let matches = self
            .resources
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(matches)
    }

    async fn has_resource(&self, ri: &str) -> Result<bool, StorageError> {
        Ok(self.resources.contains_key(ri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cse_model::{CseTime, ResourceType};

    fn sample(ri: &str, pi: Option<&str>) -> Resource {
        Resource::new(
            ri.into(),
            "r".into(),
            pi.map(String::from),
            ResourceType::Container,
            CseTime::now_plus(chrono::Duration::days(1)),
        )
    }

    #[tokio::test]
    async fn create_then_retrieve_round_trips() {
        let storage = InMemoryStorage::new();
        let created = storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        let fetched = storage.retrieve(&created.ri).await.unwrap();
        assert_eq!(fetched.ri, "cnt1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ri() {
        let storage = InMemoryStorage::new();
        storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        let err = storage.create(sample("cnt1", Some("cse1"))).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn retrieve_missing_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage.retrieve("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_applies_patch() {
        let storage = InMemoryStorage::new();
        storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        let patch = Patch::new().set("mni", 5);
        let updated = storage.update("cnt1", &patch).await.unwrap();
        assert_eq!(updated.get("mni").unwrap(), serde_json::json!(5));
    }

    #[tokio::test]
    async fn delete_removes_and_reports_not_found_after() {
        let storage = InMemoryStorage::new();
        storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        storage.delete("cnt1").await.unwrap();
        assert!(!storage.has_resource("cnt1").await.unwrap());
    }

    #[tokio::test]
    async fn children_of_finds_by_parent() {
        let storage = InMemoryStorage::new();
        storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        storage.create(sample("cnt2", Some("cse1"))).await.unwrap();
        storage.create(sample("cnt3", Some("other"))).await.unwrap();
        let children = storage.children_of(&"cse1".to_string()).await.unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn search_by_filter_scans_with_predicate() {
        let storage = InMemoryStorage::new();
        storage.create(sample("cnt1", Some("cse1"))).await.unwrap();
        let found = storage
            .search_by_filter(Box::new(|r| r.ty == ResourceType::Container))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
