//! Named, interval-scheduled background worker pool (spec §5, "Shared
//! resources").
//!
//! Grounded in the teacher's scheduler idioms (`CancellationToken` per
//! worker, a queryable job registry) but standalone rather than an Axum
//! plugin — the engine here has no HTTP server to hook a `DeferredPlugin`
//! into, so workers are started directly against a [`WorkerPool`] instance
//! rather than through `AppBuilder`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Metadata for a registered worker, queryable at runtime.
#[derive(Clone, Debug)]
pub struct JobInfo {
    pub name: String,
    pub interval: Duration,
}

/// Raised when a caller tries to register a worker name that is already in
/// use (spec §5: "creating a worker with an already-used name is a logic
/// error").
#[derive(Debug)]
pub struct DuplicateWorkerName(pub String);

impl std::fmt::Display for DuplicateWorkerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker '{}' is already registered", self.0)
    }
}

impl std::error::Error for DuplicateWorkerName {}

struct Job {
    info: JobInfo,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A pool of named, interval-scheduled background tasks. Workers are
/// singletons by name (spec §5).
#[derive(Clone, Default)]
pub struct WorkerPool {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        WorkerPool { jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Start a new named interval task. `run_on_time` controls whether the
    /// first tick fires immediately (`Duration::ZERO`) or after the given
    /// offset has elapsed (spec §5, "`runOnTime` offset").
    ///
    /// Returns [`DuplicateWorkerName`] if `name` is already registered.
    pub fn spawn_interval<F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        run_on_time: Duration,
        task: F,
    ) -> Result<(), DuplicateWorkerName>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&name) {
            return Err(DuplicateWorkerName(name));
        }

        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            if !run_on_time.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(run_on_time) => {}
                    _ = cancel_for_task.cancelled() => return,
                }
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task().await;
                    }
                    _ = cancel_for_task.cancelled() => {
                        tracing::debug!(worker = %task_name, "worker cancelled");
                        return;
                    }
                }
            }
        });

        jobs.insert(
            name.clone(),
            Job { info: JobInfo { name, interval }, cancel, handle },
        );
        Ok(())
    }

    /// Stop a single worker by name. Returns `false` if no worker with that
    /// name is registered.
    pub fn stop(&self, name: &str) -> bool {
        let job = self.jobs.lock().unwrap().remove(name);
        match job {
            Some(job) => {
                job.cancel.cancel();
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop every registered worker (spec §5, "stops cleanly on shutdown by
    /// cooperative cancellation").
    pub fn shutdown(&self) {
        let jobs: Vec<Job> = self.jobs.lock().unwrap().drain().map(|(_, job)| job).collect();
        for job in jobs {
            job.cancel.cancel();
        }
    }

    /// List currently registered workers.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.lock().unwrap().values().map(|job| job.info.clone()).collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn spawn_interval_runs_task_repeatedly() {
        let pool = WorkerPool::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        pool.spawn_interval("ticker", Duration::from_millis(10), Duration::ZERO, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(55)).await;
        pool.shutdown();
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let pool = WorkerPool::new();
        pool.spawn_interval("a", Duration::from_secs(60), Duration::ZERO, || async {}).unwrap();
        let err = pool
            .spawn_interval("a", Duration::from_secs(60), Duration::ZERO, || async {})
            .unwrap_err();
        assert_eq!(err.0, "a");
    }

    #[tokio::test]
    async fn stop_cancels_single_worker() {
        let pool = WorkerPool::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        pool.spawn_interval("ticker", Duration::from_millis(10), Duration::ZERO, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(pool.stop("ticker"));
        let seen_after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen_after_stop);
        assert!(!pool.is_running("ticker"));
    }

    #[tokio::test]
    async fn stop_unknown_worker_returns_false() {
        let pool = WorkerPool::new();
        assert!(!pool.stop("missing"));
    }

    #[tokio::test]
    async fn shutdown_stops_all_workers() {
        let pool = WorkerPool::new();
        pool.spawn_interval("a", Duration::from_millis(10), Duration::ZERO, || async {}).unwrap();
        pool.spawn_interval("b", Duration::from_millis(10), Duration::ZERO, || async {}).unwrap();
        pool.shutdown();
        assert!(pool.list_jobs().is_empty());
    }
}
