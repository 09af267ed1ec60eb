//! The Announcement Manager (spec §4.5): announce a new resource to the
//! remote CSEs named in its `at`, reconcile `at`/`aa` on update, and delete
//! every shadow when the original is removed.

use std::sync::Arc;

use cse_model::{Patch, Resource, ResourceId, ResourceType};
use cse_storage::Storage;
use tracing::warn;

use crate::transport::RemoteCseClient;

pub struct AnnouncementManager {
    storage: Arc<dyn Storage>,
    remote: Arc<dyn RemoteCseClient>,
}

impl AnnouncementManager {
    pub fn new(storage: Arc<dyn Storage>, remote: Arc<dyn RemoteCseClient>) -> Self {
        AnnouncementManager { storage, remote }
    }

    /// Spec §4.5, "Announce on create": for every remote CSE id in
    /// `child.at`, build an announced twin and persist it there. Successful
    /// announcements are appended onto the original's own `at` as
    /// `<remoteCseId>/<shadowRi>`, alongside the bare remote-CSE ids already
    /// there — `at` grows, it is never replaced.
    pub async fn on_create(&self, child: &Resource) -> Vec<String> {
        let Some(annc_ty) = child.ty.announced_variant() else { return Vec::new() };
        let mut recorded = Vec::new();

        for remote_cse_id in child.at() {
            let twin = build_twin(child, annc_ty, &child.aa());
            match self.remote.announce(&remote_cse_id, twin).await {
                Ok(shadow_ri) => recorded.push(format!("{remote_cse_id}/{shadow_ri}")),
                Err(e) => warn!(resource = %child.ri, remote = %remote_cse_id, error = %e, "announcement failed"),
            }
        }

        if !recorded.is_empty() {
            let mut new_at = child.at();
            new_at.extend(recorded.clone());
            let patch = Patch::new().set("at", serde_json::json!(new_at));
            let _ = self.storage.update(&child.ri, &patch).await;
        }
        recorded
    }

    /// Spec §4.5, "Reconcile on update": entries removed from `at` have
    /// their shadow deleted; entries added to `at` get a fresh
    /// announcement; entries present in both have their shadow patched
    /// with the subset of the update that the announced attribute set
    /// (`announced_mandatory` plus `aa`) actually covers.
    pub async fn on_update(&self, old: &Resource, new: &Resource, changed: &[String]) {
        let old_links = parse_links(&old.at());
        let new_links = parse_links(&new.at());

        for (remote_cse_id, shadow_ri) in &old_links {
            if !new_links.iter().any(|(r, _)| r == remote_cse_id) {
                let _ = self.remote.delete_announced(remote_cse_id, shadow_ri).await;
            }
        }

        let announced_attrs = announced_attribute_set(new);
        let relevant: Vec<&String> = changed.iter().filter(|a| announced_attrs.contains(a.as_str())).collect();

        for (remote_cse_id, shadow_ri) in &new_links {
            if old_links.iter().any(|(r, ri)| r == remote_cse_id && ri == shadow_ri) {
                if relevant.is_empty() {
                    continue;
                }
                let mut patch = Patch::new();
                for attr in &relevant {
                    if let Some(value) = new.get(attr) {
                        patch = patch.set((*attr).clone(), value);
                    }
                }
                let _ = self.remote.update_announced(remote_cse_id, shadow_ri, &patch).await;
            }
        }

        let fresh_targets: Vec<String> = new
            .at()
            .into_iter()
            .filter(|entry| !entry.contains('/'))
            .collect();
        if !fresh_targets.is_empty() {
            if let Some(annc_ty) = new.ty.announced_variant() {
                let mut new_at = new.at();
                for remote_cse_id in fresh_targets {
                    let twin = build_twin(new, annc_ty, &new.aa());
                    if let Ok(shadow_ri) = self.remote.announce(&remote_cse_id, twin).await {
                        new_at.push(format!("{remote_cse_id}/{shadow_ri}"));
                    }
                }
                let patch = Patch::new().set("at", serde_json::json!(new_at));
                let _ = self.storage.update(&new.ri, &patch).await;
            }
        }
    }

    /// Spec §4.5, "Delete": every shadow named in `resource.at` is removed
    /// from its remote CSE.
    pub async fn on_delete(&self, resource: &Resource) {
        for (remote_cse_id, shadow_ri) in parse_links(&resource.at()) {
            let _ = self.remote.delete_announced(&remote_cse_id, &shadow_ri).await;
        }
    }
}

fn parse_links(at: &[String]) -> Vec<(String, ResourceId)> {
    at.iter()
        .filter_map(|entry| entry.split_once('/'))
        .map(|(remote, ri)| (remote.to_string(), ri.to_string()))
        .collect()
}

fn announced_attribute_set(resource: &Resource) -> Vec<String> {
    let mut attrs: Vec<String> = cse_model::policy_for(resource.ty)
        .announced_mandatory
        .iter()
        .map(|a| a.to_string())
        .collect();
    attrs.extend(resource.aa());
    attrs
}

fn build_twin(original: &Resource, annc_ty: ResourceType, extra_attrs: &[String]) -> Resource {
    let mut twin = Resource::new(
        cse_model::unique_id(annc_ty.id_prefix()),
        format!("{}Annc", original.rn),
        None,
        annc_ty,
        original.et,
    );
    twin.attrs.insert("lnk".into(), serde_json::json!(original.ri));

    let policy = cse_model::policy_for(original.ty);
    for attr in policy.announced_mandatory {
        if let Some(value) = original.get(attr) {
            twin.attrs.insert((*attr).to_string(), value);
        }
    }
    for attr in extra_attrs {
        if let Some(value) = original.get(attr) {
            twin.attrs.insert(attr.clone(), value);
        }
    }
    twin
}
