//! The Subscription & Notification Manager (spec §4.4): verification on
//! creation, event filtering, content shaping by `nct`, and delivery with
//! bounded retry. Grounded on the `m2m:sgn` envelope shape exercised by
//! `testSUB.py` (`vrq`/`sur` for verification, `sud` for the deletion
//! notice, `nev.rep` for delivered content).

use std::sync::Arc;
use std::time::Duration;

use cse_events::{payload::SubscriptionNotificationFailed, EventBus};
use cse_model::{CseError, NotificationContentType, NotificationEventType, Patch, Resource};
use cse_storage::Storage;

use crate::lock::LockTable;
use crate::transport::{NotificationEnvelope, NotificationTransport, TransportError};

const MAX_DELIVERY_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub struct SubscriptionManager {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn NotificationTransport>,
    events: EventBus,
    /// Keyed by subscription `ri` rather than resource `ri`, so concurrent
    /// deliveries for the same subscription serialize while different
    /// subscriptions still run concurrently (spec §5, "notifications
    /// delivered in the order the triggering events occurred").
    locks: Arc<LockTable>,
}

impl SubscriptionManager {
    pub fn new(storage: Arc<dyn Storage>, transport: Arc<dyn NotificationTransport>, events: EventBus) -> Self {
        SubscriptionManager { storage, transport, events, locks: Arc::new(LockTable::new()) }
    }

    /// Spec §4.4, steps 1-2: a subscription with no live `nu` is rejected,
    /// and every URI in `nu`/`su` must answer the verification handshake
    /// before the subscription is considered admitted.
    pub async fn validate_new(&self, sub: &Resource) -> Result<(), CseError> {
        let nu = sub.nu();
        if nu.is_empty() {
            return Err(CseError::BadRequest("subscription \"nu\" must not be empty".into()));
        }

        let mut targets = nu.clone();
        if let Some(su) = sub.attrs.get("su").and_then(|v| v.as_str()) {
            targets.push(su.to_string());
        }

        let envelope = NotificationEnvelope::verification_request(&sub.ri);
        for uri in &targets {
            self.transport.post(uri, &envelope).await.map_err(|e| {
                CseError::Transient(format!("verification failed for {uri}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Spec §4.4, `enc.net = [CreateChild]` watchers attached to `parent`.
    pub async fn on_created(&self, parent: &Resource, child: &Resource) {
        let subs = self.subscriptions_of(parent, NotificationEventType::CreateChild).await;
        for sub in subs {
            self.deliver(&sub, child, NotificationEventType::CreateChild, &[]).await;
        }
    }

    /// Spec §4.4, `enc.net = [UpdateResource]` watchers attached to
    /// `resource` itself.
    pub async fn on_updated(&self, resource: &Resource, changed: &[String]) {
        let subs = self.subscriptions_of(resource, NotificationEventType::UpdateResource).await;
        for sub in subs {
            self.deliver(&sub, resource, NotificationEventType::UpdateResource, changed).await;
        }
    }

    /// Spec §4.4: `DeleteResource` watchers attached to the resource being
    /// removed, and `DeleteChild` watchers attached to its parent.
    pub async fn on_deleted(&self, parent: Option<&Resource>, resource: &Resource) {
        let self_subs = self.subscriptions_of(resource, NotificationEventType::DeleteResource).await;
        for sub in self_subs {
            self.deliver(&sub, resource, NotificationEventType::DeleteResource, &[]).await;
        }
        if let Some(parent) = parent {
            let child_subs = self.subscriptions_of(parent, NotificationEventType::DeleteChild).await;
            for sub in child_subs {
                self.deliver(&sub, resource, NotificationEventType::DeleteChild, &[]).await;
            }
        }
    }

    /// Spec §4.4, "deletion of a subscription": sends the `sud = true`
    /// notice to the subscription's own live `nu` URIs before it is torn
    /// down.
    pub async fn on_subscription_removed(&self, sub: &Resource) {
        let envelope = NotificationEnvelope::deletion_notice();
        for uri in sub.nu() {
            let _ = self.transport.post(&uri, &envelope).await;
        }
        self.locks.forget(&sub.ri);
    }

    async fn subscriptions_of(&self, watched: &Resource, event: NotificationEventType) -> Vec<Resource> {
        let children = self.storage.children_of(&watched.ri).await.unwrap_or_default();
        children
            .into_iter()
            .filter(|c| c.ty == cse_model::ResourceType::Subscription)
            .filter(|sub| matches_event(sub, event))
            .collect()
    }

    async fn deliver(&self, sub: &Resource, resource: &Resource, event: NotificationEventType, changed: &[String]) {
        let content_type = notification_content_type(sub);
        let rep = shape_content(resource, content_type, changed);
        let envelope = NotificationEnvelope::notification(rep);
        let sub = sub.clone();
        let resource = resource.clone();
        let transport = self.transport.clone();
        let events = self.events.clone();
        let storage = self.storage.clone();
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let _guard = locks.lock(&sub.ri).await;
            let mut live_nu = sub.nu();
            let mut failed = Vec::new();

            for uri in sub.nu() {
                if deliver_with_retry(transport.as_ref(), &uri, &envelope).await.is_err() {
                    failed.push(uri.clone());
                    live_nu.retain(|u| u != &uri);
                    events
                        .emit(SubscriptionNotificationFailed { subscription: sub.clone(), uri: uri.clone() })
                        .await;
                }
            }

            if !failed.is_empty() {
                let patch = Patch::new().set("nu", serde_json::json!(live_nu));
                let _ = storage.update(&sub.ri, &patch).await;
            }

            decrement_expiration_counter(storage.as_ref(), &sub).await;
            let _ = (event, resource);
        });
    }
}

/// Mirrors the subscription's `enc.net` (event-notification criteria,
/// spec §4.4): no `enc` means every event type matches.
fn matches_event(sub: &Resource, event: NotificationEventType) -> bool {
    let Some(enc) = sub.attrs.get("enc") else { return true };
    let Some(net) = enc.get("net") else { return true };
    let Some(list) = net.as_array() else { return true };
    let wanted = event as u64;
    list.iter().any(|v| v.as_u64() == Some(wanted))
}

/// `nct` is wire-encoded as the TS-0004 integer code, not a variant name.
fn notification_content_type(sub: &Resource) -> NotificationContentType {
    match sub.attrs.get("nct").and_then(|v| v.as_u64()) {
        Some(1) => NotificationContentType::AllAttributes,
        Some(2) => NotificationContentType::ModifiedAttributes,
        Some(3) => NotificationContentType::RiOnly,
        Some(4) => NotificationContentType::Trigger,
        _ => NotificationContentType::default(),
    }
}

/// Spec §4.4, content shaping by `nct`; spec §8 invariant: a
/// `modifiedAttributes` notification never carries `ty`, which holds
/// automatically since `ty` is immutable and can never appear in `changed`.
fn shape_content(resource: &Resource, content_type: NotificationContentType, changed: &[String]) -> serde_json::Value {
    match content_type {
        NotificationContentType::AllAttributes => serde_json::to_value(resource).unwrap_or(serde_json::json!({})),
        NotificationContentType::ModifiedAttributes => {
            let mut map = serde_json::Map::new();
            for key in changed {
                if let Some(value) = resource.get(key) {
                    map.insert(key.clone(), value);
                }
            }
            serde_json::Value::Object(map)
        }
        NotificationContentType::RiOnly => serde_json::json!({ "m2m:uri": resource.ri }),
        NotificationContentType::Trigger => serde_json::json!({}),
    }
}

/// Spec §4.4 / Design Notes: 3 attempts, 100ms-doubling exponential
/// backoff, target dropped from `nu` on exhaustion.
async fn deliver_with_retry(
    transport: &dyn NotificationTransport,
    uri: &str,
    envelope: &NotificationEnvelope,
) -> Result<(), TransportError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt in 0..MAX_DELIVERY_ATTEMPTS {
        match transport.post(uri, envelope).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < MAX_DELIVERY_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

/// Spec §4.4, `exc` (expiration counter): decrements on each successful
/// notification round, auto-deleting the subscription once exhausted.
async fn decrement_expiration_counter(storage: &dyn Storage, sub: &Resource) {
    let Some(exc) = sub.attrs.get("exc").and_then(|v| v.as_i64()) else { return };
    if exc <= 1 {
        let _ = storage.delete(&sub.ri).await;
    } else {
        let patch = Patch::new().set("exc", exc - 1);
        let _ = storage.update(&sub.ri, &patch).await;
    }
}
