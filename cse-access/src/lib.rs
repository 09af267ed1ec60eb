//! The Access-Control Evaluator (spec §4.3): decides allow/deny for
//! `(resource, originator, operation)`, backed by a TTL [`cache::DecisionCache`]
//! the way the teacher's OpenFGA guard wraps its backend (spec §4.3
//! annotation: "`AccessEvaluator` wraps Storage behind a `DecisionCache`-style
//! TTL cache").

pub mod cache;
pub mod policy;

pub use cache::{CacheKey, DecisionCache};
pub use policy::{grants, parse_privilege_set, AccessControlRule, PrivilegeSet};

use cse_model::{CseError, Operation, Resource, ResourceType};
use cse_storage::Storage;

const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Evaluates access-control decisions against the resource tree, caching
/// results for `DEFAULT_CACHE_TTL_SECS` (spec §4.3).
pub struct AccessEvaluator {
    cache: DecisionCache,
    cse_originator: String,
}

impl AccessEvaluator {
    pub fn new(cse_originator: impl Into<String>) -> Self {
        AccessEvaluator {
            cache: DecisionCache::new(DEFAULT_CACHE_TTL_SECS),
            cse_originator: cse_originator.into(),
        }
    }

    pub fn with_cache(cse_originator: impl Into<String>, cache: DecisionCache) -> Self {
        AccessEvaluator { cache, cse_originator: cse_originator.into() }
    }

    /// Decide whether `originator` may perform `operation` on `resource`
    /// (spec §4.3, rules 1-4).
    pub async fn check(
        &self,
        storage: &dyn Storage,
        resource: &Resource,
        originator: &str,
        operation: Operation,
    ) -> Result<bool, CseError> {
        // Rule 1: the CSE's own originator always passes.
        if originator == self.cse_originator {
            return Ok(true);
        }

        let key = CacheKey::new(originator, &resource.ri, operation);
        if let Some(decision) = self.cache.get(&key) {
            return Ok(decision);
        }

        let decision = self.evaluate(storage, resource, originator, operation).await?;
        self.cache.set(key, decision);
        Ok(decision)
    }

    /// Invalidate cached decisions for a resource whose ACP references or
    /// privilege rules just changed.
    pub fn invalidate(&self, resource_ri: &str) {
        self.cache.invalidate_resource(resource_ri);
    }

    async fn evaluate(
        &self,
        storage: &dyn Storage,
        resource: &Resource,
        originator: &str,
        operation: Operation,
    ) -> Result<bool, CseError> {
        // Rule 2: ACP resources guard themselves via `pvs`.
        if resource.ty == ResourceType::AccessControlPolicy {
            let pvs = parse_privilege_set(resource.get("pvs").as_ref());
            return Ok(grants(&pvs, originator, operation));
        }

        // Rule 3: collect `acpi`, inheriting from the nearest ancestor that
        // declares one if this resource's own list is empty.
        let acp_ris = self.resolve_acpi(storage, resource).await?;
        if acp_ris.is_empty() {
            return Ok(false);
        }

        // Rule 4: any ACP's `pv` granting the operation allows.
        for acp_ri in acp_ris {
            let acp = match storage.retrieve(&acp_ri).await {
                Ok(acp) => acp,
                Err(_) => continue, // a dangling acpi reference grants nothing
            };
            let pv = parse_privilege_set(acp.get("pv").as_ref());
            if grants(&pv, originator, operation) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Walk up `pi` links until a resource declares a non-empty `acpi`, or
    /// the root is reached (spec §4.3 step 3).
    async fn resolve_acpi(&self, storage: &dyn Storage, resource: &Resource) -> Result<Vec<String>, CseError> {
        let own = resource.acpi();
        if !own.is_empty() {
            return Ok(own);
        }
        let mut current = resource.pi.clone();
        while let Some(pi) = current {
            let parent = storage.retrieve(&pi).await?;
            let parent_acpi = parent.acpi();
            if !parent_acpi.is_empty() {
                return Ok(parent_acpi);
            }
            current = parent.pi.clone();
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cse_model::CseTime;
    use cse_storage::memory::InMemoryStorage;

    fn acp(ri: &str, pv: serde_json::Value, pvs: serde_json::Value) -> Resource {
        let mut r = Resource::new(
            ri.into(),
            "acp".into(),
            Some("cse1".into()),
            ResourceType::AccessControlPolicy,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        r.attrs.insert("pv".into(), pv);
        r.attrs.insert("pvs".into(), pvs);
        r
    }

    fn container(ri: &str, pi: &str, acpi: Vec<&str>) -> Resource {
        let mut r = Resource::new(
            ri.into(),
            "cnt".into(),
            Some(pi.into()),
            ResourceType::Container,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        r.attrs.insert("acpi".into(), serde_json::json!(acpi));
        r
    }

    #[tokio::test]
    async fn cse_originator_always_allowed() {
        let storage = InMemoryStorage::new();
        let evaluator = AccessEvaluator::new("CAdmin");
        let resource = container("cnt1", "cse1", vec![]);
        assert!(evaluator.check(&storage, &resource, "CAdmin", Operation::Delete).await.unwrap());
    }

    #[tokio::test]
    async fn acp_grants_matching_originator() {
        let storage = InMemoryStorage::new();
        storage
            .create(acp(
                "acp1",
                serde_json::json!([{"acor": ["CFoo"], "acop": cse_model::PERM_RETRIEVE}]),
                serde_json::json!([]),
            ))
            .await
            .unwrap();
        let evaluator = AccessEvaluator::new("CAdmin");
        let resource = container("cnt1", "cse1", vec!["acp1"]);
        assert!(evaluator.check(&storage, &resource, "CFoo", Operation::Retrieve).await.unwrap());
        assert!(!evaluator.check(&storage, &resource, "CFoo", Operation::Update).await.unwrap());
        assert!(!evaluator.check(&storage, &resource, "CBar", Operation::Retrieve).await.unwrap());
    }

    #[tokio::test]
    async fn acp_checks_self_privileges_for_acp_resources() {
        let storage = InMemoryStorage::new();
        let evaluator = AccessEvaluator::new("CAdmin");
        let policy = acp(
            "acp1",
            serde_json::json!([]),
            serde_json::json!([{"acor": ["CFoo"], "acop": cse_model::PERM_UPDATE}]),
        );
        assert!(evaluator.check(&storage, &policy, "CFoo", Operation::Update).await.unwrap());
        assert!(!evaluator.check(&storage, &policy, "CFoo", Operation::Delete).await.unwrap());
    }

    #[tokio::test]
    async fn inherits_acpi_from_ancestor() {
        let storage = InMemoryStorage::new();
        storage
            .create(acp(
                "acp1",
                serde_json::json!([{"acor": ["all"], "acop": cse_model::PERM_RETRIEVE}]),
                serde_json::json!([]),
            ))
            .await
            .unwrap();
        let parent = container("parent", "cse1", vec!["acp1"]);
        storage.create(parent).await.unwrap();
        let child = container("child", "parent", vec![]);

        let evaluator = AccessEvaluator::new("CAdmin");
        assert!(evaluator.check(&storage, &child, "anyone", Operation::Retrieve).await.unwrap());
    }

    #[tokio::test]
    async fn no_acpi_anywhere_denies() {
        let storage = InMemoryStorage::new();
        let evaluator = AccessEvaluator::new("CAdmin");
        let resource = container("cnt1", "cse1", vec![]);
        assert!(!evaluator.check(&storage, &resource, "CFoo", Operation::Retrieve).await.unwrap());
    }

    #[tokio::test]
    async fn decision_is_cached() {
        let storage = InMemoryStorage::new();
        storage
            .create(acp(
                "acp1",
                serde_json::json!([{"acor": ["CFoo"], "acop": cse_model::PERM_RETRIEVE}]),
                serde_json::json!([]),
            ))
            .await
            .unwrap();
        let evaluator = AccessEvaluator::new("CAdmin");
        let resource = container("cnt1", "cse1", vec!["acp1"]);
        assert!(evaluator.check(&storage, &resource, "CFoo", Operation::Retrieve).await.unwrap());
        assert_eq!(evaluator.cache.len(), 1);
        evaluator.invalidate("cnt1");
        assert_eq!(evaluator.cache.len(), 0);
    }
}
