//! The `Cse` facade: wires the access evaluator, event bus, managers, and
//! dispatcher around a `Storage` backend, bootstraps the root `CSEBase`, and
//! starts the expiration-monitor background worker (spec §4.2, §6).

use std::sync::Arc;
use std::time::Duration;

use cse_access::AccessEvaluator;
use cse_config::CseSettings;
use cse_events::EventBus;
use cse_model::{unique_id, CseError, CseTime, Resource, ResourceType};
use cse_scheduler::WorkerPool;
use cse_storage::Storage;

use crate::announcement::AnnouncementManager;
use crate::dispatcher::Dispatcher;
use crate::lock::LockTable;
use crate::registration::RegistrationManager;
use crate::subscription::SubscriptionManager;
use crate::transport::{NotificationTransport, RemoteCseClient};

/// Name of the background worker running [`RegistrationManager::run_expiration_sweep`].
const EXPIRATION_WORKER: &str = "expiration-monitor";

/// A fully wired CSE instance: the dispatcher plus the background worker
/// that sweeps expired resources. Built once at startup and shared (behind
/// an `Arc`, or simply by value since every field is itself cheaply
/// cloneable) across request handlers.
pub struct Cse {
    pub dispatcher: Arc<Dispatcher>,
    registration: Arc<RegistrationManager>,
    workers: WorkerPool,
    settings: Arc<CseSettings>,
}

impl Cse {
    /// Wire every collaborator together and ensure the root `CSEBase`
    /// exists, but do not yet start the expiration monitor — call
    /// [`Cse::start`] once the caller is ready to run in the background.
    pub async fn bootstrap(
        settings: CseSettings,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn NotificationTransport>,
        remote: Arc<dyn RemoteCseClient>,
    ) -> Result<Self, CseError> {
        let settings = Arc::new(settings);
        ensure_cse_base(storage.as_ref(), &settings).await?;

        let events = EventBus::new();
        let access = Arc::new(AccessEvaluator::new(settings.cse_originator.clone()));
        let locks = Arc::new(LockTable::new());
        let registration = Arc::new(RegistrationManager::new(storage.clone(), events.clone(), settings.clone()));
        let subscription = Arc::new(SubscriptionManager::new(storage.clone(), transport, events.clone()));
        let announcement = Arc::new(AnnouncementManager::new(storage.clone(), remote));

        let dispatcher = Arc::new(Dispatcher::new(
            storage,
            access,
            events,
            locks,
            registration.clone(),
            subscription,
            announcement,
            settings.clone(),
        ));

        Ok(Cse { dispatcher, registration, workers: WorkerPool::new(), settings })
    }

    /// Start the expiration-monitor worker, sweeping every
    /// `check_expirations_interval_secs` (spec §4.2). A no-op if already
    /// running — `bootstrap` + `start` may be called once per process.
    pub fn start(&self) {
        if self.workers.is_running(EXPIRATION_WORKER) {
            return;
        }
        let registration = self.registration.clone();
        let dispatcher = self.dispatcher.clone();
        let interval = Duration::from_secs(self.settings.check_expirations_interval_secs);
        let _ = self.workers.spawn_interval(EXPIRATION_WORKER, interval, interval, move || {
            let registration = registration.clone();
            let dispatcher = dispatcher.clone();
            async move {
                if let Err(e) = registration.run_expiration_sweep(&dispatcher).await {
                    tracing::warn!(error = %e, "expiration sweep failed");
                }
            }
        });
    }

    /// Stop the expiration monitor and any other background workers
    /// cooperatively (spec §5, "stops cleanly on shutdown").
    pub fn shutdown(&self) {
        self.workers.shutdown();
    }

    pub fn settings(&self) -> &CseSettings {
        self.settings.as_ref()
    }
}

/// Create the root `CSEBase` if it does not already exist, bypassing the
/// dispatcher's create pipeline (there is no parent to authorize against).
async fn ensure_cse_base(storage: &dyn Storage, settings: &CseSettings) -> Result<(), CseError> {
    let existing = storage
        .search_by_value_in_field("rn", &serde_json::Value::String(settings.cse_rn.clone()))
        .await?;
    if existing.into_iter().any(|r| r.pi.is_none() && r.ty == ResourceType::CseBase) {
        return Ok(());
    }

    let mut cse_base = Resource::new(
        unique_id(ResourceType::CseBase.id_prefix()),
        settings.cse_rn.clone(),
        None,
        ResourceType::CseBase,
        CseTime::now_plus(chrono::Duration::days(365 * 100)),
    );
    cse_base.attrs.insert("csi".into(), serde_json::json!(format!("/{}", settings.cse_rn)));
    cse_base.cr = Some(settings.cse_originator.clone());
    storage.create(cse_base).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AcmeNotificationTransport, InMemoryRemoteCse};
    use cse_model::CseType;
    use cse_storage::memory::InMemoryStorage;

    fn settings() -> CseSettings {
        CseSettings {
            cse_originator: "CAdmin".into(),
            cse_rn: "cse-in".into(),
            cse_type: CseType::In,
            allowed_ae_originators: Vec::new(),
            allowed_csr_originators: Vec::new(),
            check_expirations_interval_secs: 1,
            default_acp_pvs_acop: cse_model::PERM_ALL,
        }
    }

    async fn build() -> Cse {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let transport = Arc::new(AcmeNotificationTransport::new());
        let remote = Arc::new(InMemoryRemoteCse::new());
        Cse::bootstrap(settings(), storage, transport, remote).await.unwrap()
    }

    #[tokio::test]
    async fn bootstrap_creates_cse_base_once() {
        let cse = build().await;
        let root = cse.dispatcher.retrieve("cse-in", "CAdmin").await.unwrap();
        assert_eq!(root.ty, ResourceType::CseBase);
        assert_eq!(root.rn, "cse-in");
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_against_existing_storage() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let transport = Arc::new(AcmeNotificationTransport::new());
        let remote = Arc::new(InMemoryRemoteCse::new());
        let first = Cse::bootstrap(settings(), storage.clone(), transport.clone(), remote.clone()).await.unwrap();
        let root_first = first.dispatcher.retrieve("cse-in", "CAdmin").await.unwrap();

        let second = Cse::bootstrap(settings(), storage, transport, remote).await.unwrap();
        let root_second = second.dispatcher.retrieve("cse-in", "CAdmin").await.unwrap();
        assert_eq!(root_first.ri, root_second.ri);
    }

    #[tokio::test]
    async fn start_runs_expiration_sweep_periodically() {
        let cse = build().await;
        cse.start();
        assert!(cse.workers.is_running(EXPIRATION_WORKER));
        cse.shutdown();
        assert!(!cse.workers.is_running(EXPIRATION_WORKER));
    }
}
