//! The `Resource` node type and the patch representation `update()` applies.

use crate::time::CseTime;
use crate::types::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resource identifier (`ri`).
pub type ResourceId = String;

/// A node in the CSE resource tree (spec §3, "Resource").
///
/// Structural attributes common to every type are typed fields; the rest
/// (type-specific attributes, plus the optional `lbl`/`acpi`/announcement
/// attributes) live in the generic `attrs` bag, matched against the
/// declared [`crate::policy::AttributePolicy`] for the type rather than
/// hard-coded per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub ri: ResourceId,
    pub rn: String,
    /// `None` only for the root `CSEBase`.
    pub pi: Option<ResourceId>,
    pub ty: ResourceType,
    pub ct: CseTime,
    pub lt: CseTime,
    pub et: CseTime,
    /// Creator originator, set once at creation, immutable (spec §3).
    pub cr: Option<String>,
    /// Owner-link edge: set when this resource was created internally on
    /// behalf of another resource (e.g. an ACP created during AE
    /// registration). The dispatcher's delete cascade removes such children
    /// when their owner is deleted (spec §9, "Design Notes").
    pub created_internally: Option<ResourceId>,
    /// Type-specific and optional common attributes (`lbl`, `acpi`, `nu`,
    /// `enc`, `at`, `aa`, `lnk`, `aei`, `csi`, ...), keyed by their short
    /// oneM2M attribute name.
    pub attrs: Map<String, Value>,
}

impl Resource {
    /// Construct a new resource shell with server-assigned structural
    /// attributes. Callers fill in `attrs` afterwards.
    pub fn new(ri: ResourceId, rn: String, pi: Option<ResourceId>, ty: ResourceType, et: CseTime) -> Self {
        let now = CseTime::now();
        Resource {
            ri,
            rn,
            pi,
            ty,
            ct: now,
            lt: now,
            et,
            cr: None,
            created_internally: None,
            attrs: Map::new(),
        }
    }

    /// Read an attribute by its short oneM2M name, covering both the typed
    /// structural fields and the generic `attrs` bag.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "ri" => Some(Value::String(self.ri.clone())),
            "rn" => Some(Value::String(self.rn.clone())),
            "pi" => self.pi.clone().map(Value::String),
            "ty" => serde_json::to_value(self.ty).ok(),
            "ct" => serde_json::to_value(self.ct).ok(),
            "lt" => serde_json::to_value(self.lt).ok(),
            "et" => serde_json::to_value(self.et).ok(),
            "cr" => self.cr.clone().map(Value::String),
            "createdInternally" => self.created_internally.clone().map(Value::String),
            _ => self.attrs.get(name).cloned(),
        }
    }

    /// Whether the attribute bag (not the structural fields) carries `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Typed helper: `nu` (subscription notification URIs).
    pub fn nu(&self) -> Vec<String> {
        self.attrs
            .get("nu")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Typed helper: `at` (announcement target list).
    pub fn at(&self) -> Vec<String> {
        self.attrs
            .get("at")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Typed helper: `aa` (additional announced attribute names).
    pub fn aa(&self) -> Vec<String> {
        self.attrs
            .get("aa")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Typed helper: `acpi` (access-control policy references).
    pub fn acpi(&self) -> Vec<ResourceId> {
        self.attrs
            .get("acpi")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Typed helper: `lnk` (announced-shadow link back to its original).
    pub fn lnk(&self) -> Option<ResourceId> {
        self.attrs.get("lnk").and_then(|v| v.as_str()).map(String::from)
    }
}

/// A shallow-merge patch, as `update()` applies it (spec §4.1): a key
/// mapped to `Value::Null` removes the attribute; any other value
/// overwrites it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patch(pub Map<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Patch(Map::new())
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::Null);
        self
    }
}

/// Apply `patch` to `resource.attrs`, returning the names of attributes
/// that actually changed value (used for `nct = modifiedAttributes`
/// notifications, spec §4.4). Bumps `lt`.
///
/// Structural fields named in `immutable` are rejected by the caller before
/// this is invoked — `apply_patch` only ever touches the `attrs` bag.
pub fn apply_patch(resource: &mut Resource, patch: &Patch) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in &patch.0 {
        if value.is_null() {
            if resource.attrs.remove(key).is_some() {
                changed.push(key.clone());
            }
        } else {
            let previous = resource.attrs.get(key);
            if previous != Some(value) {
                resource.attrs.insert(key.clone(), value.clone());
                changed.push(key.clone());
            }
        }
    }
    if !changed.is_empty() {
        resource.lt = CseTime::now();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Resource {
        let mut r = Resource::new(
            "cnt1".into(),
            "myContainer".into(),
            Some("cse1".into()),
            ResourceType::Container,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        r.attrs.insert("lbl".into(), serde_json::json!(["a"]));
        r
    }

    #[test]
    fn get_returns_structural_fields() {
        let r = sample();
        assert_eq!(r.get("ri").unwrap(), Value::String("cnt1".into()));
        assert_eq!(r.get("pi").unwrap(), Value::String("cse1".into()));
    }

    #[test]
    fn apply_patch_sets_and_removes() {
        let mut r = sample();
        let patch = Patch::new().set("mni", 10).remove("lbl");
        let changed = apply_patch(&mut r, &patch);
        assert!(changed.contains(&"mni".to_string()));
        assert!(changed.contains(&"lbl".to_string()));
        assert_eq!(r.get("mni").unwrap(), serde_json::json!(10));
        assert!(!r.has_attribute("lbl"));
    }

    #[test]
    fn apply_patch_bumps_lt_only_on_real_change() {
        let mut r = sample();
        let ct = r.ct;
        let lt_before = r.lt;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let noop = Patch::new().set("lbl", serde_json::json!(["a"]));
        let changed = apply_patch(&mut r, &noop);
        assert!(changed.is_empty());
        assert_eq!(r.lt, lt_before);
        assert_eq!(r.ct, ct);

        let real = Patch::new().set("lbl", serde_json::json!(["b"]));
        apply_patch(&mut r, &real);
        assert!(r.lt >= lt_before);
    }

    #[test]
    fn get_exposes_created_internally_for_search_by_value_in_field() {
        let mut r = sample();
        assert!(r.get("createdInternally").is_none());
        r.created_internally = Some("ae1".into());
        assert_eq!(r.get("createdInternally").unwrap(), Value::String("ae1".into()));
    }

    #[test]
    fn typed_helpers_default_to_empty() {
        let r = sample();
        assert!(r.nu().is_empty());
        assert!(r.at().is_empty());
    }
}
