pub mod error;
pub mod id;
pub mod policy;
pub mod resource;
pub mod time;
pub mod types;

pub use error::{CseError, ResponseStatusCode};
pub use id::{id_from_originator, normalize_originator, unique_id, unique_suffix, MAX_ID_LENGTH};
pub use policy::{accepts_child, creator_allowed, policy_for, AttributePolicy, CREATOR_ALLOWED};
pub use resource::{apply_patch, Patch, Resource, ResourceId};
pub use time::CseTime;
pub use types::{
    CseType, NotificationContentType, NotificationEventType, Operation, Permission, ResourceType,
    PERM_ALL, PERM_CREATE, PERM_DELETE, PERM_DISCOVERY, PERM_NOTIFY, PERM_RETRIEVE, PERM_UPDATE,
};
