//! Remote collaborators the Subscription and Announcement Managers speak to
//! (spec §6, "Transport collaborators"): the verification/notification
//! envelope a subscriber receives, and the twin-resource protocol an
//! announcement target receives. Both are behind traits so tests run
//! against in-memory reflectors instead of a real HTTP/MQTT stack.

use async_trait::async_trait;
use cse_model::{Patch, Resource, ResourceId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The `m2m:sgn` signal envelope: subscription verification request
/// (`vrq`/`sur`), deletion notice (`sud`), or an ordinary notification
/// (`nev`) (spec §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrq: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sud: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nev: Option<NotificationEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub rep: serde_json::Value,
}

impl NotificationEnvelope {
    pub fn verification_request(subscription_ri: &str) -> Self {
        NotificationEnvelope { vrq: Some(true), sur: Some(subscription_ri.to_string()), sud: None, nev: None }
    }

    pub fn deletion_notice() -> Self {
        NotificationEnvelope { vrq: None, sur: None, sud: Some(true), nev: None }
    }

    pub fn notification(rep: serde_json::Value) -> Self {
        NotificationEnvelope { vrq: None, sur: None, sud: None, nev: Some(NotificationEvent { rep }) }
    }
}

/// Why a transport delivery failed. `Unreachable` is retried by the caller
/// with backoff (spec §7, "transient remote failures"); `Rejected` means
/// the target answered but not with an acceptance status and is treated the
/// same way for subscription purposes (spec doesn't distinguish the two for
/// retry policy).
#[derive(Debug, Clone)]
pub enum TransportError {
    Unreachable(String),
    Rejected(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Unreachable(u) => write!(f, "target not reachable: {u}"),
            TransportError::Rejected(u) => write!(f, "target rejected delivery: {u}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Delivers notification envelopes to a subscriber's `nu`/`su` URI (spec §6,
/// "Accepted URI schemes: http, https, mqtt, mqtts, plus ... acme").
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn post(&self, uri: &str, envelope: &NotificationEnvelope) -> Result<(), TransportError>;
}

/// Production transport: HTTP(S) only. `mqtt(s)` targets would need a
/// persistent broker connection this reference engine does not maintain.
pub struct HttpNotificationTransport {
    client: reqwest::Client,
}

impl HttpNotificationTransport {
    pub fn new(timeout: Duration) -> Self {
        HttpNotificationTransport {
            client: reqwest::Client::builder().timeout(timeout).build().expect("reqwest client"),
        }
    }
}

#[async_trait]
impl NotificationTransport for HttpNotificationTransport {
    async fn post(&self, uri: &str, envelope: &NotificationEnvelope) -> Result<(), TransportError> {
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            return Err(TransportError::Unreachable(format!("unsupported scheme: {uri}")));
        }
        let response = self
            .client
            .post(uri)
            .json(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("status {}", response.status())))
        }
    }
}

/// In-memory reflector for the `acme://` pseudo-scheme (spec §6, "an
/// internal pseudo-scheme acme for test reflection"). Every envelope posted
/// to a URI is retained in arrival order; a URI can be made to reject
/// deliveries to exercise the retry/drop path.
#[derive(Default)]
pub struct AcmeNotificationTransport {
    inboxes: DashMap<String, Vec<NotificationEnvelope>>,
    rejecting: DashMap<String, bool>,
}

impl AcmeNotificationTransport {
    pub fn new() -> Self {
        AcmeNotificationTransport::default()
    }

    /// Make `uri` reject every subsequent delivery (simulates an
    /// unreachable notification server).
    pub fn set_rejecting(&self, uri: &str, rejecting: bool) {
        self.rejecting.insert(uri.to_string(), rejecting);
    }

    pub fn inbox(&self, uri: &str) -> Vec<NotificationEnvelope> {
        self.inboxes.get(uri).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn last(&self, uri: &str) -> Option<NotificationEnvelope> {
        self.inboxes.get(uri).and_then(|v| v.last().cloned())
    }
}

#[async_trait]
impl NotificationTransport for AcmeNotificationTransport {
    async fn post(&self, uri: &str, envelope: &NotificationEnvelope) -> Result<(), TransportError> {
        if self.rejecting.get(uri).map(|r| *r).unwrap_or(false) {
            return Err(TransportError::Unreachable(uri.to_string()));
        }
        self.inboxes.entry(uri.to_string()).or_default().push(envelope.clone());
        Ok(())
    }
}

/// Announce/update/delete shadow resources on a remote CSE (spec §4.5). The
/// announcement manager depends on this rather than on `NotificationTransport`
/// since it carries full resource representations, not signal envelopes.
#[async_trait]
pub trait RemoteCseClient: Send + Sync {
    /// Create `twin` as a child of `remote_cse_id`'s resource tree, returning
    /// the remote-assigned resource identifier.
    async fn announce(&self, remote_cse_id: &str, twin: Resource) -> Result<ResourceId, TransportError>;
    async fn update_announced(&self, remote_cse_id: &str, ri: &str, patch: &Patch) -> Result<(), TransportError>;
    async fn delete_announced(&self, remote_cse_id: &str, ri: &str) -> Result<(), TransportError>;
    /// Whether an announced shadow is still retrievable on the remote side
    /// (spec §8, "every shadow in its `at` to become not-retrievable").
    async fn retrieve_announced(&self, remote_cse_id: &str, ri: &str) -> Option<Resource>;
}

/// Reference `RemoteCseClient` used by tests and single-process
/// deployments: each remote CSE is itself an [`cse_storage::Storage`], and
/// "announcing" is just creating the twin there directly.
pub struct InMemoryRemoteCse {
    remotes: DashMap<String, Arc<dyn cse_storage::Storage>>,
}

impl Default for InMemoryRemoteCse {
    fn default() -> Self {
        InMemoryRemoteCse { remotes: DashMap::new() }
    }
}

impl InMemoryRemoteCse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_remote(&self, remote_cse_id: &str, storage: Arc<dyn cse_storage::Storage>) {
        self.remotes.insert(remote_cse_id.to_string(), storage);
    }

    fn remote(&self, remote_cse_id: &str) -> Result<Arc<dyn cse_storage::Storage>, TransportError> {
        self.remotes
            .get(remote_cse_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| TransportError::Unreachable(remote_cse_id.to_string()))
    }
}

#[async_trait]
impl RemoteCseClient for InMemoryRemoteCse {
    async fn announce(&self, remote_cse_id: &str, twin: Resource) -> Result<ResourceId, TransportError> {
        let remote = self.remote(remote_cse_id)?;
        let created = remote.create(twin).await.map_err(|e| TransportError::Rejected(e.to_string()))?;
        Ok(created.ri)
    }

    async fn update_announced(&self, remote_cse_id: &str, ri: &str, patch: &Patch) -> Result<(), TransportError> {
        let remote = self.remote(remote_cse_id)?;
        remote.update(ri, patch).await.map_err(|e| TransportError::Rejected(e.to_string()))?;
        Ok(())
    }

    async fn delete_announced(&self, remote_cse_id: &str, ri: &str) -> Result<(), TransportError> {
        let remote = self.remote(remote_cse_id)?;
        match remote.delete(ri).await {
            Ok(_) => Ok(()),
            Err(cse_storage::StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(TransportError::Rejected(e.to_string())),
        }
    }

    async fn retrieve_announced(&self, remote_cse_id: &str, ri: &str) -> Option<Resource> {
        let remote = self.remote(remote_cse_id).ok()?;
        remote.retrieve(ri).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acme_transport_records_and_can_reject() {
        let transport = AcmeNotificationTransport::new();
        transport.post("acme://ns1", &NotificationEnvelope::verification_request("sub1")).await.unwrap();
        assert_eq!(transport.inbox("acme://ns1").len(), 1);

        transport.set_rejecting("acme://ns1", true);
        let err = transport.post("acme://ns1", &NotificationEnvelope::deletion_notice()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn in_memory_remote_cse_round_trips_announce() {
        use cse_model::{CseTime, ResourceType};
        use cse_storage::memory::InMemoryStorage;

        let remote = InMemoryRemoteCse::new();
        remote.register_remote("CSE-REMOTE", Arc::new(InMemoryStorage::new()));

        let twin = Resource::new(
            "annc1".into(),
            "annc1".into(),
            Some("remoteCseRoot".into()),
            ResourceType::AeAnnc,
            CseTime::now_plus(chrono::Duration::days(1)),
        );
        let ri = remote.announce("CSE-REMOTE", twin).await.unwrap();
        assert!(remote.retrieve_announced("CSE-REMOTE", &ri).await.is_some());
        remote.delete_announced("CSE-REMOTE", &ri).await.unwrap();
        assert!(remote.retrieve_announced("CSE-REMOTE", &ri).await.is_none());
    }
}
