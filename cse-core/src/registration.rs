//! The Registration Manager (spec §4.2), grounded on `RegistrationManager.py`:
//! admission/deregistration for AE, RemoteCSE, and Request resources, the
//! creator-attribute policy applied to every creation, and the internal-ACP
//! helpers used during AE admission.
//!
//! Deliberately holds no reference back to the Dispatcher: the ACP helpers
//! persist through `storage`/`events` directly, the same primitive the
//! Dispatcher itself builds on, which keeps the manager graph a DAG instead
//! of a cycle through `Dispatcher`.

use std::sync::Arc;

use cse_config::CseSettings;
use cse_events::{payload::*, EventBus};
use cse_model::{
    creator_allowed, id_from_originator, unique_id, CseError, CseTime, CseType,
    Patch, Permission, Resource, ResourceType, PERM_ALL,
};
use cse_storage::Storage;

use crate::dispatcher::Dispatcher;

/// Outcome of admission for a registerable resource: the (possibly
/// reassigned) originator the rest of the create pipeline should use.
pub struct AdmissionOutcome {
    pub originator: String,
}

pub struct RegistrationManager {
    storage: Arc<dyn Storage>,
    events: EventBus,
    settings: Arc<CseSettings>,
}

impl RegistrationManager {
    pub fn new(storage: Arc<dyn Storage>, events: EventBus, settings: Arc<CseSettings>) -> Self {
        RegistrationManager { storage, events, settings }
    }

    /// Runs for every resource creation, registerable or not (mirrors
    /// `RegistrationManager.checkResourceCreation`): dispatches to the
    /// type-specific admission handler, then applies the universal creator
    /// attribute policy.
    pub async fn check_resource_creation(
        &self,
        resource: &mut Resource,
        originator: &str,
        parent: &Resource,
    ) -> Result<AdmissionOutcome, CseError> {
        let originator = match resource.ty {
            ResourceType::Ae => self.handle_ae_registration(resource, originator, parent).await?,
            ResourceType::Request => self.handle_req_registration(resource, originator)?,
            ResourceType::RemoteCse => self.handle_csr_registration(resource, originator).await?,
            _ => originator.to_string(),
        };
        self.handle_creator(resource, &originator)?;
        Ok(AdmissionOutcome { originator })
    }

    /// Mirrors `RegistrationManager.checkResourceUpdate`: only `RemoteCSE`
    /// updates carry manager-specific behavior (spec §4.2 delegates the rest
    /// to the generic dispatcher pipeline).
    pub async fn check_resource_update(&self, resource: &Resource, patch: &Patch) -> Result<(), CseError> {
        if resource.ty == ResourceType::RemoteCse {
            self.handle_csr_update(resource, patch).await;
        }
        Ok(())
    }

    /// Mirrors `RegistrationManager.checkResourceDeletion`.
    pub async fn check_resource_deletion(&self, resource: &Resource) -> Result<(), CseError> {
        match resource.ty {
            ResourceType::RemoteCse => self.events.emit(RemoteCseHasDeregistered(resource.clone())).await,
            ResourceType::Ae | ResourceType::Request => {}
            _ => {}
        }
        Ok(())
    }

    async fn handle_ae_registration(
        &self,
        ae: &mut Resource,
        originator: &str,
        parent: &Resource,
    ) -> Result<String, CseError> {
        if parent.ty != ResourceType::CseBase {
            return Err(CseError::NotAllowed("AE parent must be the CSEBase".into()));
        }

        let requested = if originator.is_empty() { "C" } else { originator };

        if !is_originator_allowed(requested, &self.settings.allowed_ae_originators) {
            return Err(CseError::AppRuleValidationFailed(format!(
                "originator not allowed to register: {requested}"
            )));
        }

        let assigned = match requested {
            "C" => unique_id("C"),
            "S" => unique_id("S"),
            other => id_from_originator(other),
        };

        let existing = self.storage.search_by_value_in_field("aei", &serde_json::Value::String(assigned.clone())).await?;
        if !existing.is_empty() {
            return Err(CseError::AlreadyRegistered(format!("originator has already registered: {assigned}")));
        }

        ae.attrs.insert("aei".into(), serde_json::Value::String(assigned.clone()));
        ae.ri = assigned.clone();
        ae.cr = Some(assigned.clone());

        let acp = self
            .create_acp(
                parent,
                &format!("{assigned}-acp"),
                &assigned,
                vec![assigned.clone()],
                PERM_ALL,
                vec![],
                self.settings.default_acp_pvs_acop,
            )
            .await?;
        ae.attrs.insert("acpi".into(), serde_json::json!([acp.ri]));

        Ok(assigned)
    }

    fn handle_req_registration(&self, _req: &Resource, originator: &str) -> Result<String, CseError> {
        Ok(originator.to_string())
    }

    async fn handle_csr_registration(&self, csr: &Resource, originator: &str) -> Result<String, CseError> {
        if self.settings.cse_type == CseType::Asn {
            return Err(CseError::NotAllowed("cannot register a child CSE on an ASN".into()));
        }
        if !is_originator_allowed(originator, &self.settings.allowed_csr_originators) {
            return Err(CseError::AppRuleValidationFailed(format!(
                "originator not allowed to register: {originator}"
            )));
        }
        self.events.emit(RemoteCseHasRegistered(csr.clone())).await;
        Ok(originator.to_string())
    }

    async fn handle_csr_update(&self, csr: &Resource, patch: &Patch) {
        self.events.emit(RemoteCseUpdate { before: csr.clone(), patch: patch.clone() }).await;
    }

    /// Mirrors `RegistrationManager.handleCreator`: the `cr` attribute may
    /// only appear on creator-bearing types, and only as a marker slot —
    /// the server, never the client, assigns its value.
    fn handle_creator(&self, resource: &mut Resource, originator: &str) -> Result<(), CseError> {
        if resource.has_attribute("cr") {
            if !creator_allowed(resource.ty) {
                return Err(CseError::BadRequest(format!(
                    "\"cr\" attribute is not allowed for resource type: {:?}",
                    resource.ty
                )));
            }
            if !resource.attrs.get("cr").map(|v| v.is_null()).unwrap_or(true) {
                return Err(CseError::BadRequest("setting \"cr\" attribute is not allowed".into()));
            }
            resource.attrs.remove("cr");
        }
        if creator_allowed(resource.ty) {
            resource.cr = Some(originator.to_string());
        }
        Ok(())
    }

    /// Mirrors `RegistrationManager._createACP`: remove any stale ACP with
    /// the same structured name, then create a fresh one owned by
    /// `owner_ri`, appending the CSE's own originator to both permission
    /// lists.
    pub async fn create_acp(
        &self,
        parent: &Resource,
        rn: &str,
        owner_ri: &str,
        originators: Vec<String>,
        permission: Permission,
        self_originators: Vec<String>,
        self_permission: Permission,
    ) -> Result<Resource, CseError> {
        if let Ok(existing) = self.find_by_structured_name(parent, rn).await {
            self.storage.delete(&existing.ri).await.ok();
        }

        let mut origs = originators;
        origs.push(self.settings.cse_originator.clone());
        let mut self_origs = vec![self.settings.cse_originator.clone()];
        self_origs.extend(self_originators);

        let mut acp = Resource::new(
            unique_id(ResourceType::AccessControlPolicy.id_prefix()),
            rn.to_string(),
            Some(parent.ri.clone()),
            ResourceType::AccessControlPolicy,
            CseTime::now_plus(chrono::Duration::days(365 * 10)),
        );
        acp.created_internally = Some(owner_ri.to_string());
        acp.cr = Some(self.settings.cse_originator.clone());
        acp.attrs.insert("pv".into(), serde_json::json!([{"acor": origs, "acop": permission}]));
        acp.attrs.insert("pvs".into(), serde_json::json!([{"acor": self_origs, "acop": self_permission}]));

        let created = self.storage.create(acp).await?;
        self.events.emit(CreatedResource(created.clone())).await;
        Ok(created)
    }

    /// Mirrors `RegistrationManager._removeACP`: only tears down an ACP that
    /// was created internally on behalf of the resource now being removed.
    pub async fn remove_acp(&self, parent: &Resource, rn: &str, owner_ri: &str) {
        if let Ok(acp) = self.find_by_structured_name(parent, rn).await {
            if acp.created_internally.as_deref() == Some(owner_ri) {
                if let Ok(deleted) = self.storage.delete(&acp.ri).await {
                    self.events.emit(DeletedResource(deleted)).await;
                }
            }
        }
    }

    /// The expiration monitor (spec §4.2, "expiration monitor"): find every
    /// resource whose `et` has passed, and delete it (with deregistration)
    /// through the dispatcher so the normal cascade/notification/
    /// announcement pipeline runs. Takes `&Dispatcher` as a plain parameter
    /// rather than a stored field, so the manager graph stays acyclic.
    ///
    /// Re-checks `has_resource` immediately before each delete: a resource
    /// already removed as part of an earlier candidate's cascade (e.g. a
    /// child whose parent also expired in the same sweep) is skipped rather
    /// than erroring.
    pub async fn run_expiration_sweep(&self, dispatcher: &Dispatcher) -> Result<usize, CseError> {
        let now = CseTime::now();
        let expired = self
            .storage
            .search_by_filter(Box::new(move |r| r.et.is_expired_at(now)))
            .await?;

        let mut count = 0;
        for resource in expired {
            if !self.storage.has_resource(&resource.ri).await? {
                continue;
            }
            match dispatcher.delete(&resource.ri, &self.settings.cse_originator, true).await {
                Ok(deleted) => {
                    self.events.emit(ExpireResource(deleted)).await;
                    count += 1;
                }
                Err(e) => {
                    tracing::warn!(resource = %resource.ri, error = %e, "expiration sweep failed to delete resource");
                }
            }
        }
        Ok(count)
    }

    async fn find_by_structured_name(&self, parent: &Resource, rn: &str) -> Result<Resource, CseError> {
        let children = self.storage.children_of(&parent.ri).await?;
        children
            .into_iter()
            .find(|c| c.rn == rn)
            .ok_or_else(|| CseError::NotFound(format!("{rn} not found under {}", parent.ri)))
    }
}

/// Whether `originator` matches one of `patterns` (spec §4.2, "globbable
/// prefix lists"). A pattern ending in `*` matches as a prefix; otherwise
/// the match must be exact. An empty pattern list means unrestricted.
pub fn is_originator_allowed(originator: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| match p.strip_suffix('*') {
        Some(prefix) => originator.starts_with(prefix),
        None => originator == p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cse_storage::memory::InMemoryStorage;

    fn settings() -> Arc<CseSettings> {
        Arc::new(CseSettings {
            cse_originator: "CAdmin".into(),
            cse_rn: "cse-in".into(),
            cse_type: CseType::In,
            allowed_ae_originators: Vec::new(),
            allowed_csr_originators: Vec::new(),
            check_expirations_interval_secs: 60,
            default_acp_pvs_acop: cse_model::PERM_ALL,
        })
    }

    fn cse_base() -> Resource {
        Resource::new(
            "cse1".into(),
            "cse-in".into(),
            None,
            ResourceType::CseBase,
            CseTime::now_plus(chrono::Duration::days(365 * 10)),
        )
    }

    fn ae(rn: &str) -> Resource {
        let mut r = Resource::new(
            "placeholder".into(),
            rn.into(),
            Some("cse1".into()),
            ResourceType::Ae,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        r.attrs.insert("api".into(), serde_json::json!("NMyApp1Id"));
        r.attrs.insert("rr".into(), serde_json::json!(false));
        r
    }

    #[tokio::test]
    async fn ae_registration_assigns_c_prefixed_originator() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage, EventBus::new(), settings());
        let mut resource = ae("myApp");
        let outcome = manager.check_resource_creation(&mut resource, "C", &cse_base()).await.unwrap();
        assert!(outcome.originator.starts_with('C'));
        assert_eq!(resource.ri, outcome.originator);
        assert_eq!(resource.get("aei").unwrap(), serde_json::json!(outcome.originator));
    }

    #[tokio::test]
    async fn ae_registration_sets_creator_to_its_own_assigned_aei() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage, EventBus::new(), settings());
        let mut resource = ae("myApp");
        let outcome = manager.check_resource_creation(&mut resource, "C", &cse_base()).await.unwrap();
        assert_eq!(resource.cr.as_deref(), Some(outcome.originator.as_str()));
        assert_eq!(resource.get("aei").unwrap(), serde_json::json!(resource.cr));
    }

    #[tokio::test]
    async fn ae_registration_creates_default_acp_and_sets_acpi() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage.clone(), EventBus::new(), settings());
        let mut resource = ae("myApp");
        let outcome = manager.check_resource_creation(&mut resource, "C", &cse_base()).await.unwrap();

        let acpi = resource.get("acpi").unwrap();
        let acp_ri = acpi.as_array().unwrap()[0].as_str().unwrap().to_string();

        let acp = storage.retrieve(&acp_ri).await.unwrap();
        assert_eq!(acp.ty, ResourceType::AccessControlPolicy);
        assert_eq!(acp.created_internally.as_deref(), Some(outcome.originator.as_str()));
        let pv = acp.get("pv").unwrap();
        let acor = pv[0]["acor"].as_array().unwrap();
        assert!(acor.iter().any(|v| v.as_str() == Some(outcome.originator.as_str())));
    }

    #[tokio::test]
    async fn ae_reregistration_with_same_aei_is_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage.clone(), EventBus::new(), settings());
        let mut first = ae("app1");
        let outcome = manager.check_resource_creation(&mut first, "CFixed", &cse_base()).await.unwrap();
        first.ri = outcome.originator.clone();
        storage.create(first).await.unwrap();

        let mut second = ae("app2");
        let err = manager.check_resource_creation(&mut second, "CFixed", &cse_base()).await.unwrap_err();
        assert!(matches!(err, CseError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn ae_parent_must_be_cse_base() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage, EventBus::new(), settings());
        let mut resource = ae("myApp");
        let not_cse = Resource::new(
            "cnt1".into(),
            "cnt".into(),
            Some("cse1".into()),
            ResourceType::Container,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        let err = manager.check_resource_creation(&mut resource, "C", &not_cse).await.unwrap_err();
        assert!(matches!(err, CseError::NotAllowed(_)));
    }

    #[test]
    fn originator_allowlist_supports_prefix_wildcard() {
        let patterns = vec!["C*".to_string()];
        assert!(is_originator_allowed("CFoo", &patterns));
        assert!(!is_originator_allowed("SFoo", &patterns));
        assert!(is_originator_allowed("anything", &[]));
    }

    #[tokio::test]
    async fn creator_attribute_rejected_for_non_creator_bearing_type() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage, EventBus::new(), settings());
        let mut resource = ae("myApp");
        resource.attrs.insert("cr".into(), serde_json::Value::Null);
        let err = manager.check_resource_creation(&mut resource, "C", &cse_base()).await.unwrap_err();
        assert!(matches!(err, CseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_acp_appends_cse_originator_to_permission_lists() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let manager = RegistrationManager::new(storage.clone(), EventBus::new(), settings());
        let parent = cse_base();
        storage.create(parent.clone()).await.unwrap();
        let acp = manager
            .create_acp(&parent, "myApp-acp", "ae1", vec!["CFoo".into()], cse_model::PERM_ALL, vec![], cse_model::PERM_ALL)
            .await
            .unwrap();
        let pv = acp.get("pv").unwrap();
        let acor = pv[0]["acor"].as_array().unwrap();
        assert!(acor.iter().any(|v| v == "CAdmin"));
        assert_eq!(acp.created_internally.as_deref(), Some("ae1"));
    }
}
