//! Resource type tags and the small enums/bitmasks the core engine switches
//! on (permissions, notification event types, notification content types).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The oneM2M resource type tag (`ty`).
///
/// `*Annc` variants are announced shadows (spec §3, "Invariants") — they
/// carry the same attribute policy as their original plus `lnk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    CseBase,
    Ae,
    Container,
    ContentInstance,
    Subscription,
    AccessControlPolicy,
    Node,
    MgmtObj,
    RemoteCse,
    Request,
    AeAnnc,
    ContainerAnnc,
    RemoteCseAnnc,
}

impl ResourceType {
    /// The short prefix used when generating a resource identifier for this
    /// type (e.g. `AE` resources get `ri` prefixed `C...`/`S...` from their
    /// originator instead — see [`crate::id::unique_id`] callers).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceType::CseBase => "CB",
            ResourceType::Ae => "C",
            ResourceType::Container => "CNT",
            ResourceType::ContentInstance => "CIN",
            ResourceType::Subscription => "SUB",
            ResourceType::AccessControlPolicy => "ACP",
            ResourceType::Node => "NOD",
            ResourceType::MgmtObj => "MGO",
            ResourceType::RemoteCse => "CSR",
            ResourceType::Request => "REQ",
            ResourceType::AeAnnc => "CAnnc",
            ResourceType::ContainerAnnc => "CNTAnnc",
            ResourceType::RemoteCseAnnc => "CSRAnnc",
        }
    }

    /// Whether this type is an announced shadow of another type.
    pub fn is_announced(&self) -> bool {
        matches!(
            self,
            ResourceType::AeAnnc | ResourceType::ContainerAnnc | ResourceType::RemoteCseAnnc
        )
    }

    /// The announced variant of this type, if one exists.
    pub fn announced_variant(&self) -> Option<ResourceType> {
        match self {
            ResourceType::Ae => Some(ResourceType::AeAnnc),
            ResourceType::Container => Some(ResourceType::ContainerAnnc),
            ResourceType::RemoteCse => Some(ResourceType::RemoteCseAnnc),
            _ => None,
        }
    }

    /// Resource types registerable through the Registration Manager (spec
    /// §4.1: "invokes the Registration Manager hook if `child.ty ∈ {AE,
    /// Remote-CSE-descriptor, Request}`").
    pub fn is_registerable(&self) -> bool {
        matches!(
            self,
            ResourceType::Ae | ResourceType::RemoteCse | ResourceType::Request
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The oneM2M CSE tier (spec §4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CseType {
    /// Infrastructure Node — the full-featured tier.
    In,
    /// Middle Node.
    Mn,
    /// Application Service Node — leaf tier, cannot host child CSEs.
    Asn,
}

/// A permission bitmask over {CREATE, RETRIEVE, UPDATE, DELETE, NOTIFY,
/// DISCOVERY} (spec §3, "Access-control policies").
pub type Permission = u16;

pub const PERM_CREATE: Permission = 1 << 0;
pub const PERM_RETRIEVE: Permission = 1 << 1;
pub const PERM_UPDATE: Permission = 1 << 2;
pub const PERM_DELETE: Permission = 1 << 3;
pub const PERM_NOTIFY: Permission = 1 << 4;
pub const PERM_DISCOVERY: Permission = 1 << 5;
pub const PERM_ALL: Permission =
    PERM_CREATE | PERM_RETRIEVE | PERM_UPDATE | PERM_DELETE | PERM_NOTIFY | PERM_DISCOVERY;

/// The operation an access-control check is performed for. Maps 1:1 onto a
/// single `PERM_*` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Retrieve,
    Update,
    Delete,
    Notify,
    Discovery,
}

impl Operation {
    pub fn bit(&self) -> Permission {
        match self {
            Operation::Create => PERM_CREATE,
            Operation::Retrieve => PERM_RETRIEVE,
            Operation::Update => PERM_UPDATE,
            Operation::Delete => PERM_DELETE,
            Operation::Notify => PERM_NOTIFY,
            Operation::Discovery => PERM_DISCOVERY,
        }
    }
}

/// Subscription event-notification criteria net-type (`enc.net`, spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NotificationEventType {
    UpdateResource = 1,
    DeleteResource = 2,
    CreateChild = 3,
    DeleteChild = 4,
    RetrieveResource = 5,
}

/// Notification content type (`nct`, spec §4.4). On the wire this is the
/// TS-0004 integer code, not the variant name or discriminant value —
/// callers parse/render it explicitly rather than through `serde`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum NotificationContentType {
    #[default]
    AllAttributes = 1,
    ModifiedAttributes = 2,
    RiOnly = 3,
    Trigger = 4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_bit_is_single_bit() {
        for op in [
            Operation::Create,
            Operation::Retrieve,
            Operation::Update,
            Operation::Delete,
            Operation::Notify,
            Operation::Discovery,
        ] {
            assert_eq!(op.bit().count_ones(), 1);
        }
    }

    #[test]
    fn perm_all_covers_every_operation() {
        assert_eq!(
            PERM_ALL,
            PERM_CREATE | PERM_RETRIEVE | PERM_UPDATE | PERM_DELETE | PERM_NOTIFY | PERM_DISCOVERY
        );
    }

    #[test]
    fn announced_variant_round_trips_is_announced() {
        let annc = ResourceType::Ae.announced_variant().unwrap();
        assert!(annc.is_announced());
        assert!(!ResourceType::Ae.is_announced());
    }

    #[test]
    fn registerable_types() {
        assert!(ResourceType::Ae.is_registerable());
        assert!(ResourceType::RemoteCse.is_registerable());
        assert!(ResourceType::Request.is_registerable());
        assert!(!ResourceType::Container.is_registerable());
    }
}
