//! Event payload types carried on the [`crate::EventBus`] (spec §6, "Event
//! bus events"). Each struct corresponds to one in-process event name; the
//! name itself only exists implicitly as the payload's Rust type, since
//! dispatch is by `TypeId` rather than by string.

use cse_model::{Patch, Resource};

/// `createdResource` — emitted after a resource is durably persisted,
/// before the response is returned (spec §4.1).
#[derive(Debug, Clone)]
pub struct CreatedResource(pub Resource);

/// `updatedResource` — emitted after an update is applied, carrying the
/// post-update resource and the names of attributes that actually changed
/// (spec §4.4, `nct = modifiedAttributes`).
#[derive(Debug, Clone)]
pub struct UpdatedResource {
    pub resource: Resource,
    pub changed_attributes: Vec<String>,
}

/// `deletedResource` — emitted once per resource removed by a delete,
/// including cascaded descendants (spec §4.1, "Delete cascades to
/// descendants").
#[derive(Debug, Clone)]
pub struct DeletedResource(pub Resource);

/// `expireResource` — emitted by the expiration monitor once a resource
/// whose `et` has passed has been deleted (spec §4.2, "expiration
/// monitor").
#[derive(Debug, Clone)]
pub struct ExpireResource(pub Resource);

/// `remoteCSEHasRegistered` — emitted after a `RemoteCSE` descriptor is
/// admitted (spec §4.2, "handleCSRRegistration").
#[derive(Debug, Clone)]
pub struct RemoteCseHasRegistered(pub Resource);

/// `remoteCSEHasDeregistered` — emitted after a `RemoteCSE` descriptor and
/// its owned resources are torn down (spec §4.2, "handleCSRDeRegistration").
#[derive(Debug, Clone)]
pub struct RemoteCseHasDeregistered(pub Resource);

/// `remoteCSEUpdate` — emitted when a registered `RemoteCSE` descriptor is
/// updated. Carries the pre-update snapshot alongside the patch rather than
/// only the patch, since announcement reconciliation needs the prior `at`/
/// `aa` state to diff against (design decision, see project notes).
#[derive(Debug, Clone)]
pub struct RemoteCseUpdate {
    pub before: Resource,
    pub patch: Patch,
}

/// `subscriptionNotificationFailed` — raised when a notification target
/// exhausts its retry budget and is dropped from `nu` (spec §4.4,
/// "Delivery").
#[derive(Debug, Clone)]
pub struct SubscriptionNotificationFailed {
    pub subscription: Resource,
    pub uri: String,
}
