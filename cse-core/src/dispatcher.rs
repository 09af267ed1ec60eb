//! The Dispatcher (spec §4.1): the single entry point for create / retrieve
//! / update / delete, orchestrating the Access-Control Evaluator, the
//! Registration Manager, and the Subscription/Announcement managers around
//! the `Storage` collaborator. Grounded on `RegistrationManager.py`'s own
//! hook-dispatch convention (`checkResourceCreation`/`checkResourceUpdate`/
//! `checkResourceDeletion`), translated from its `onRequest`-style pipeline
//! into an explicit `Result`-returning Rust pipeline.
//!
//! Holds `Arc`s to the managers, never the reverse — the Registration
//! Manager's expiration sweep instead receives `&Dispatcher` as a plain
//! parameter at call time, so the manager graph stays acyclic (see
//! [`crate::registration::RegistrationManager::run_expiration_sweep`]).

use std::collections::HashMap;
use std::sync::Arc;

use cse_config::CseSettings;
use cse_events::{payload::*, EventBus};
use cse_model::{accepts_child, policy_for, unique_id, CseError, Operation, Patch, Resource, ResourceId, ResourceType};
use cse_storage::Storage;

use crate::announcement::AnnouncementManager;
use crate::lock::LockTable;
use crate::registration::RegistrationManager;
use crate::subscription::SubscriptionManager;

pub struct Dispatcher {
    storage: Arc<dyn Storage>,
    access: Arc<cse_access::AccessEvaluator>,
    events: EventBus,
    locks: Arc<LockTable>,
    registration: Arc<RegistrationManager>,
    subscription: Arc<SubscriptionManager>,
    announcement: Arc<AnnouncementManager>,
    settings: Arc<CseSettings>,
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        access: Arc<cse_access::AccessEvaluator>,
        events: EventBus,
        locks: Arc<LockTable>,
        registration: Arc<RegistrationManager>,
        subscription: Arc<SubscriptionManager>,
        announcement: Arc<AnnouncementManager>,
        settings: Arc<CseSettings>,
    ) -> Self {
        Dispatcher { storage, access, events, locks, registration, subscription, announcement, settings }
    }

    /// Spec §4.1, "Create": validate against the parent's declared schema,
    /// run the Registration Manager hook (which applies to every creation,
    /// not only registerable types — it is also where the creator-attribute
    /// policy lives), verify a new subscription's `nu`/`su` targets before
    /// admitting it, persist, then fan out to the Subscription and
    /// Announcement managers.
    pub async fn create(&self, parent_id: &str, mut child: Resource, originator: &str) -> Result<Resource, CseError> {
        let parent = self.storage.retrieve(parent_id).await?;
        self.authorize(&parent, originator, Operation::Create).await?;

        if !accepts_child(parent.ty, child.ty) {
            return Err(CseError::NotAllowed(format!(
                "{:?} does not accept children of type {:?}",
                parent.ty, child.ty
            )));
        }

        let policy = policy_for(child.ty);
        for attr in policy.mandatory {
            if child.get(attr).is_none() {
                return Err(CseError::BadRequest(format!("missing mandatory attribute \"{attr}\"")));
            }
        }
        for attr in policy.immutable {
            // "cr" is immutable once assigned, but a client may supply an
            // empty slot on create for the Registration Manager to fill in
            // (spec §4.2) — `handle_creator` below is the gate for it.
            if *attr == "cr" {
                continue;
            }
            if child.attrs.contains_key(*attr) {
                return Err(CseError::BadRequest(format!(
                    "\"{attr}\" is immutable and may not be set by the client"
                )));
            }
        }

        child.ri = unique_id(child.ty.id_prefix());
        if child.rn.is_empty() {
            child.rn = child.ri.clone();
        }
        child.pi = Some(parent.ri.clone());

        let siblings = self.storage.children_of(&parent.ri).await?;
        if siblings.iter().any(|s| s.rn == child.rn) {
            return Err(CseError::Conflict(format!("duplicate resource name \"{}\"", child.rn)));
        }

        self.registration.check_resource_creation(&mut child, originator, &parent).await?;

        if child.ty == ResourceType::Subscription {
            self.subscription.validate_new(&child).await?;
        }

        let created = {
            let _guard = self.locks.lock(&child.ri).await;
            self.storage.create(child).await?
        };

        self.events.emit(CreatedResource(created.clone())).await;
        self.subscription.on_created(&parent, &created).await;
        self.announcement.on_create(&created).await;

        Ok(created)
    }

    /// Spec §4.1, "Retrieve": accepts either a raw `ri` or a structured
    /// `<CSE-name>/<rn>/<rn>/...` path.
    pub async fn retrieve(&self, id: &str, originator: &str) -> Result<Resource, CseError> {
        let resource = self.resolve(id).await?;
        self.authorize(&resource, originator, Operation::Retrieve).await?;
        Ok(resource)
    }

    /// Spec §4.1, "Update": immutable attributes are rejected before the
    /// patch is applied; the pre-update snapshot is handed to the
    /// Registration and Announcement managers since reconciliation needs
    /// to diff against prior state.
    pub async fn update(&self, id: &str, patch: Patch, originator: &str) -> Result<Resource, CseError> {
        let before = self.storage.retrieve(id).await?;
        self.authorize(&before, originator, Operation::Update).await?;

        let policy = policy_for(before.ty);
        for key in patch.0.keys() {
            if policy.immutable.contains(&key.as_str()) {
                return Err(CseError::BadRequest(format!("\"{key}\" is immutable")));
            }
        }

        self.registration.check_resource_update(&before, &patch).await?;

        let after = {
            let _guard = self.locks.lock(id).await;
            self.storage.update(id, &patch).await?
        };

        let changed: Vec<String> = patch
            .0
            .keys()
            .filter(|k| before.attrs.get(k.as_str()) != after.attrs.get(k.as_str()))
            .cloned()
            .collect();

        self.access.invalidate(id);
        self.events
            .emit(UpdatedResource { resource: after.clone(), changed_attributes: changed.clone() })
            .await;
        self.subscription.on_updated(&after, &changed).await;
        self.announcement.on_update(&before, &after, &changed).await;

        Ok(after)
    }

    /// Spec §4.1, "Delete": cascades to every structural descendant plus
    /// any resource created internally on behalf of one (e.g. an ACP
    /// created during AE registration), locking the whole batch
    /// parent-before-child, deleting leaves-before-parents, and only then
    /// — outside the lock — running the notification/announcement/
    /// deregistration side effects against the captured pre-delete
    /// snapshots (spec §5: locks are not held across remote I/O).
    pub async fn delete(&self, id: &str, originator: &str, with_deregistration: bool) -> Result<Resource, CseError> {
        let root = self.storage.retrieve(id).await?;
        self.authorize(&root, originator, Operation::Delete).await?;

        let mut batch = self.collect_descendants(root.clone()).await?;
        let extra = self.collect_internally_owned(&batch).await?;
        batch.extend(extra);

        let by_ri: HashMap<ResourceId, Resource> = batch.iter().map(|r| (r.ri.clone(), r.clone())).collect();
        let ris: Vec<ResourceId> = batch.iter().map(|r| r.ri.clone()).collect();

        {
            let _guards = self.locks.lock_many(&ris).await;
            for resource in batch.iter().rev() {
                self.storage.delete(&resource.ri).await?;
            }
        }
        for ri in &ris {
            self.locks.forget(ri);
        }

        for resource in batch.iter().rev() {
            let parent = match &resource.pi {
                Some(pi) => match by_ri.get(pi) {
                    Some(p) => Some(p.clone()),
                    None => self.storage.retrieve(pi).await.ok(),
                },
                None => None,
            };

            if resource.ty == ResourceType::Subscription {
                self.subscription.on_subscription_removed(resource).await;
            }
            self.subscription.on_deleted(parent.as_ref(), resource).await;
            self.announcement.on_delete(resource).await;
            if with_deregistration && resource.ty.is_registerable() {
                self.registration.check_resource_deletion(resource).await?;
            }
            self.events.emit(DeletedResource(resource.clone())).await;
            self.access.invalidate(&resource.ri);
        }

        Ok(root)
    }

    pub fn settings(&self) -> &CseSettings {
        self.settings.as_ref()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    async fn authorize(&self, resource: &Resource, originator: &str, op: Operation) -> Result<(), CseError> {
        let allowed = self.access.check(self.storage.as_ref(), resource, originator, op).await?;
        if allowed {
            Ok(())
        } else {
            Err(CseError::Forbidden(format!("{originator} lacks {op:?} on {}", resource.ri)))
        }
    }

    async fn resolve(&self, id: &str) -> Result<Resource, CseError> {
        if let Ok(resource) = self.storage.retrieve(id).await {
            return Ok(resource);
        }

        let mut segments = id.split('/').filter(|s| !s.is_empty());
        let first = segments.next().ok_or_else(|| CseError::NotFound(id.to_string()))?;
        if first != self.settings.cse_rn {
            return Err(CseError::NotFound(id.to_string()));
        }

        let roots = self
            .storage
            .search_by_value_in_field("rn", &serde_json::Value::String(first.to_string()))
            .await?;
        let mut current = roots
            .into_iter()
            .find(|r| r.pi.is_none())
            .ok_or_else(|| CseError::NotFound(id.to_string()))?;

        for rn in segments {
            let children = self.storage.children_of(&current.ri).await?;
            current = children
                .into_iter()
                .find(|c| c.rn == rn)
                .ok_or_else(|| CseError::NotFound(id.to_string()))?;
        }
        Ok(current)
    }

    async fn collect_descendants(&self, root: Resource) -> Result<Vec<Resource>, CseError> {
        let mut result = vec![root.clone()];
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            let children = self.storage.children_of(&parent.ri).await?;
            for child in children {
                result.push(child.clone());
                frontier.push(child);
            }
        }
        Ok(result)
    }

    async fn collect_internally_owned(&self, batch: &[Resource]) -> Result<Vec<Resource>, CseError> {
        let mut extra = Vec::new();
        for resource in batch {
            let owned = self
                .storage
                .search_by_value_in_field("createdInternally", &serde_json::Value::String(resource.ri.clone()))
                .await?;
            extra.extend(owned);
        }
        Ok(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AcmeNotificationTransport, InMemoryRemoteCse};
    use cse_access::AccessEvaluator;
    use cse_config::CseSettings;
    use cse_model::{CseTime, CseType, PERM_ALL};
    use cse_storage::memory::InMemoryStorage;

    fn settings() -> Arc<CseSettings> {
        Arc::new(CseSettings {
            cse_originator: "CAdmin".into(),
            cse_rn: "cse-in".into(),
            cse_type: CseType::In,
            allowed_ae_originators: Vec::new(),
            allowed_csr_originators: Vec::new(),
            check_expirations_interval_secs: 60,
            default_acp_pvs_acop: PERM_ALL,
        })
    }

    async fn build() -> (Dispatcher, Arc<dyn Storage>, Arc<CseSettings>) {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let settings = settings();
        let cse_base = Resource::new(
            "cse1".into(),
            settings.cse_rn.clone(),
            None,
            ResourceType::CseBase,
            CseTime::now_plus(chrono::Duration::days(365 * 10)),
        );
        storage.create(cse_base).await.unwrap();

        let access = Arc::new(AccessEvaluator::new(settings.cse_originator.clone()));
        let events = EventBus::new();
        let locks = Arc::new(LockTable::new());
        let registration = Arc::new(RegistrationManager::new(storage.clone(), events.clone(), settings.clone()));
        let transport = Arc::new(AcmeNotificationTransport::new());
        let subscription = Arc::new(SubscriptionManager::new(storage.clone(), transport, events.clone()));
        let remote = Arc::new(InMemoryRemoteCse::new());
        let announcement = Arc::new(AnnouncementManager::new(storage.clone(), remote));

        let dispatcher = Dispatcher::new(storage.clone(), access, events, locks, registration, subscription, announcement, settings.clone());
        (dispatcher, storage, settings)
    }

    fn ae_skeleton() -> Resource {
        let mut r = Resource::new(
            String::new(),
            String::new(),
            None,
            ResourceType::Ae,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        r.attrs.insert("api".into(), serde_json::json!("NMyApp1Id"));
        r.attrs.insert("rr".into(), serde_json::json!(false));
        r
    }

    #[tokio::test]
    async fn create_ae_assigns_c_prefixed_originator_as_ri() {
        let (dispatcher, _storage, _settings) = build().await;
        let created = dispatcher.create("cse1", ae_skeleton(), "C").await.unwrap();
        assert!(created.ri.starts_with('C'));
        assert_eq!(created.get("aei").unwrap(), serde_json::json!(created.ri));
    }

    #[tokio::test]
    async fn create_accepts_null_cr_slot_and_assigns_creator() {
        let (dispatcher, _storage, _settings) = build().await;
        let owner = dispatcher.create("cse1", ae_skeleton(), "C").await.unwrap();

        let mut sub = Resource::new(
            String::new(),
            "watch".into(),
            None,
            ResourceType::Subscription,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        sub.attrs.insert("nu".into(), serde_json::json!(["acme://watcher"]));
        sub.attrs.insert("cr".into(), serde_json::Value::Null);

        let created = dispatcher.create(&owner.ri, sub, &owner.ri).await.unwrap();
        assert_eq!(created.cr.as_deref(), Some(owner.ri.as_str()));
        assert!(!created.attrs.contains_key("cr"));
    }

    #[tokio::test]
    async fn create_rejects_client_supplied_cr_value() {
        let (dispatcher, _storage, _settings) = build().await;
        let owner = dispatcher.create("cse1", ae_skeleton(), "C").await.unwrap();

        let mut sub = Resource::new(
            String::new(),
            "watch".into(),
            None,
            ResourceType::Subscription,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        sub.attrs.insert("nu".into(), serde_json::json!(["acme://watcher"]));
        sub.attrs.insert("cr".into(), serde_json::json!("CSomeoneElse"));

        let err = dispatcher.create(&owner.ri, sub, &owner.ri).await.unwrap_err();
        assert!(matches!(err, CseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_rejects_disallowed_child_type() {
        let (dispatcher, _storage, _settings) = build().await;
        let cin = Resource::new(
            String::new(),
            String::new(),
            None,
            ResourceType::ContentInstance,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        let err = dispatcher.create("cse1", cin, "CAdmin").await.unwrap_err();
        assert!(matches!(err, CseError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn retrieve_resolves_structured_path() {
        let (dispatcher, _storage, _settings) = build().await;
        let created = dispatcher.create("cse1", ae_skeleton(), "CAdmin").await.unwrap();
        let path = format!("cse-in/{}", created.rn);
        let fetched = dispatcher.retrieve(&path, "CAdmin").await.unwrap();
        assert_eq!(fetched.ri, created.ri);
    }

    #[tokio::test]
    async fn update_rejects_immutable_attribute() {
        let (dispatcher, _storage, _settings) = build().await;
        let created = dispatcher.create("cse1", ae_skeleton(), "CAdmin").await.unwrap();
        let patch = Patch::new().set("ty", serde_json::json!(1));
        let err = dispatcher.update(&created.ri, patch, "CAdmin").await.unwrap_err();
        assert!(matches!(err, CseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_subscription_rejects_when_verification_fails() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let settings = settings();
        let cse_base = Resource::new("cse1".into(), settings.cse_rn.clone(), None, ResourceType::CseBase, CseTime::now_plus(chrono::Duration::days(365 * 10)));
        storage.create(cse_base).await.unwrap();

        let access = Arc::new(AccessEvaluator::new(settings.cse_originator.clone()));
        let events = EventBus::new();
        let locks = Arc::new(LockTable::new());
        let registration = Arc::new(RegistrationManager::new(storage.clone(), events.clone(), settings.clone()));
        let transport = Arc::new(AcmeNotificationTransport::new());
        transport.set_rejecting("acme://dead", true);
        let subscription = Arc::new(SubscriptionManager::new(storage.clone(), transport, events.clone()));
        let remote = Arc::new(InMemoryRemoteCse::new());
        let announcement = Arc::new(AnnouncementManager::new(storage.clone(), remote));
        let dispatcher = Dispatcher::new(storage, access, events, locks, registration, subscription, announcement, settings);

        let mut sub = Resource::new(String::new(), "sub".into(), None, ResourceType::Subscription, CseTime::now_plus(chrono::Duration::days(1)));
        sub.attrs.insert("nu".into(), serde_json::json!(["acme://dead"]));
        let err = dispatcher.create("cse1", sub, "CAdmin").await.unwrap_err();
        assert!(matches!(err, CseError::Transient(_)));
        assert!(storage_is_empty_of_subscriptions(&dispatcher).await);
    }

    async fn storage_is_empty_of_subscriptions(dispatcher: &Dispatcher) -> bool {
        dispatcher
            .storage
            .search_by_value_in_field("rn", &serde_json::Value::String("sub".into()))
            .await
            .unwrap()
            .is_empty()
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let (dispatcher, storage, _settings) = build().await;
        let ae = dispatcher.create("cse1", ae_skeleton(), "CAdmin").await.unwrap();
        let mut cnt = Resource::new(String::new(), "box".into(), None, ResourceType::Container, CseTime::now_plus(chrono::Duration::days(1)));
        cnt.rn = "box".into();
        let cnt = dispatcher.create(&ae.ri, cnt, "CAdmin").await.unwrap();

        dispatcher.delete(&ae.ri, "CAdmin", true).await.unwrap();
        assert!(!storage.has_resource(&ae.ri).await.unwrap());
        assert!(!storage.has_resource(&cnt.ri).await.unwrap());
    }

    #[tokio::test]
    async fn delete_also_removes_internally_owned_acp() {
        let (dispatcher, storage, settings) = build().await;
        let ae = dispatcher.create("cse1", ae_skeleton(), "CAdmin").await.unwrap();

        let cse_base = storage.retrieve("cse1").await.unwrap();
        let registration = RegistrationManager::new(storage.clone(), EventBus::new(), settings.clone());
        let acp = registration
            .create_acp(&cse_base, "myApp-acp", &ae.ri, vec![], PERM_ALL, vec![], PERM_ALL)
            .await
            .unwrap();

        dispatcher.delete(&ae.ri, "CAdmin", true).await.unwrap();
        assert!(!storage.has_resource(&acp.ri).await.unwrap());
    }

    #[tokio::test]
    async fn expiration_sweep_deletes_expired_resource() {
        let (dispatcher, storage, settings) = build().await;
        let mut expired = ae_skeleton();
        expired.et = CseTime::now_plus(chrono::Duration::seconds(-1));
        let created = dispatcher.create("cse1", expired, "C").await.unwrap();

        let live = ae_skeleton();
        let kept = dispatcher.create("cse1", live, "C2").await.unwrap();

        let sweep = RegistrationManager::new(storage.clone(), EventBus::new(), settings.clone());
        let removed = sweep.run_expiration_sweep(&dispatcher).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!storage.has_resource(&created.ri).await.unwrap());
        assert!(storage.has_resource(&kept.ri).await.unwrap());
    }
}
