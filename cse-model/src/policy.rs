//! The type registry (spec §9, "Design Notes"): per-type attribute policy
//! and the static parent/child compatibility table, replacing runtime
//! attribute lookup on loosely typed resource bags with a declared schema
//! the dispatcher switches on by `ty` tag.

use crate::types::ResourceType;

/// Declared schema for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct AttributePolicy {
    /// Attributes that must be present for a resource of this type.
    pub mandatory: &'static [&'static str],
    /// Attributes that may be present.
    pub optional: &'static [&'static str],
    /// The subset of attributes replicated to an announced shadow by
    /// default, before `aa` additions (spec §4.5).
    pub announced_mandatory: &'static [&'static str],
    /// Attributes the client may never set directly — assigned by the
    /// server at creation and fixed for the resource's life (spec §4.1:
    /// "`ri`, `ct`, `cr`, `ty`, `pi` are immutable").
    pub immutable: &'static [&'static str],
    /// Child resource types this type accepts (spec §3 invariant: "the
    /// parent exists and accepts children of type `ty`").
    pub allowed_children: &'static [ResourceType],
}

const COMMON_IMMUTABLE: &[&str] = &["ri", "ct", "cr", "ty", "pi"];

/// Resource types allowed to carry a client-supplied `cr` (creator)
/// attribute slot at all — even then the *value* must be omitted by the
/// client and is assigned by the server (spec §4.2, "creator attribute
/// policy").
pub const CREATOR_ALLOWED: &[ResourceType] = &[
    ResourceType::Subscription,
    ResourceType::Container,
    ResourceType::ContentInstance,
    ResourceType::AccessControlPolicy,
];

/// Look up the declared schema for a resource type.
pub fn policy_for(ty: ResourceType) -> AttributePolicy {
    use ResourceType::*;
    match ty {
        CseBase => AttributePolicy {
            mandatory: &["rn", "csi"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[Ae, Container, AccessControlPolicy, Node, RemoteCse, Subscription, Request],
        },
        Ae => AttributePolicy {
            mandatory: &["api", "rr"],
            optional: &["lbl", "acpi", "srv", "at", "aa", "poa", "nl"],
            announced_mandatory: &["api", "rr"],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[Container, AccessControlPolicy, Subscription],
        },
        Container => AttributePolicy {
            mandatory: &["rn"],
            optional: &["lbl", "acpi", "mni", "mbs", "mia", "at", "aa"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[Container, ContentInstance, Subscription],
        },
        ContentInstance => AttributePolicy {
            mandatory: &["cnf", "con"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[],
        },
        Subscription => AttributePolicy {
            mandatory: &["nu"],
            optional: &["enc", "nct", "exc", "su", "lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[],
        },
        AccessControlPolicy => AttributePolicy {
            mandatory: &["pv", "pvs"],
            optional: &["lbl"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[],
        },
        Node => AttributePolicy {
            mandatory: &["ni"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[MgmtObj, Subscription],
        },
        MgmtObj => AttributePolicy {
            mandatory: &[],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[Subscription],
        },
        RemoteCse => AttributePolicy {
            mandatory: &["csi", "cb", "rr"],
            optional: &["lbl", "acpi", "poa"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[Ae, Container, AccessControlPolicy, Subscription, Node, AeAnnc, ContainerAnnc, RemoteCseAnnc],
        },
        Request => AttributePolicy {
            mandatory: &["op", "to"],
            optional: &["lbl"],
            immutable: COMMON_IMMUTABLE,
            announced_mandatory: &[],
            allowed_children: &[],
        },
        AeAnnc => AttributePolicy {
            mandatory: &["lnk", "api", "rr"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[ContainerAnnc, Subscription],
        },
        ContainerAnnc => AttributePolicy {
            mandatory: &["lnk"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[ContainerAnnc, ContentInstance, Subscription],
        },
        RemoteCseAnnc => AttributePolicy {
            mandatory: &["lnk"],
            optional: &["lbl", "acpi"],
            announced_mandatory: &[],
            immutable: COMMON_IMMUTABLE,
            allowed_children: &[],
        },
    }
}

/// Whether `parent_ty` accepts a child of type `child_ty` (spec §3
/// invariant).
pub fn accepts_child(parent_ty: ResourceType, child_ty: ResourceType) -> bool {
    policy_for(parent_ty)
        .allowed_children
        .iter()
        .any(|&t| t == child_ty)
}

/// Whether resource type `ty` may carry a `cr` attribute slot at all (spec
/// §4.2, "creator attribute policy").
pub fn creator_allowed(ty: ResourceType) -> bool {
    CREATOR_ALLOWED.contains(&ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceType::*;

    #[test]
    fn cse_base_accepts_ae() {
        assert!(accepts_child(CseBase, Ae));
        assert!(!accepts_child(ContentInstance, Ae));
    }

    #[test]
    fn container_accepts_content_instance_and_nested_container() {
        assert!(accepts_child(Container, ContentInstance));
        assert!(accepts_child(Container, Container));
        assert!(!accepts_child(Container, Ae));
    }

    #[test]
    fn content_instance_is_a_leaf() {
        assert!(policy_for(ContentInstance).allowed_children.is_empty());
    }

    #[test]
    fn creator_allowed_matches_subscription_and_small_set() {
        assert!(creator_allowed(Subscription));
        assert!(creator_allowed(Container));
        assert!(!creator_allowed(Ae));
    }

    #[test]
    fn common_immutable_attributes_present_on_every_type() {
        for ty in [CseBase, Ae, Container, ContentInstance, Subscription, AccessControlPolicy] {
            let policy = policy_for(ty);
            for attr in ["ri", "ct", "cr", "ty", "pi"] {
                assert!(policy.immutable.contains(&attr), "{ty:?} missing {attr}");
            }
        }
    }
}
