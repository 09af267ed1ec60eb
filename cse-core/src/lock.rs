//! Per-resource advisory locking (spec §5, "per-resource advisory lock").
//!
//! One lock per `ri`. Locks are acquired in parent-to-child order during
//! cascading delete to avoid deadlock, and released as soon as the
//! sub-operation completes rather than held across remote I/O.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use cse_model::ResourceId;

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<ResourceId, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    fn entry(&self, ri: &str) -> Arc<Mutex<()>> {
        self.locks.entry(ri.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the lock for a single resource.
    pub async fn lock(&self, ri: &str) -> OwnedMutexGuard<()> {
        self.entry(ri).lock_owned().await
    }

    /// Acquire locks for a set of resources in the given order. Callers pass
    /// parent-before-child order for cascading operations; sorting by
    /// caller-supplied order (not lexicographic) avoids deadlock between
    /// concurrent cascades that share an ancestor.
    pub async fn lock_many(&self, ris: &[ResourceId]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(ris.len());
        for ri in ris {
            guards.push(self.lock(ri).await);
        }
        guards
    }

    /// Drop the table entry for a resource once it no longer exists, so the
    /// map doesn't grow unboundedly for deleted resources.
    pub fn forget(&self, ri: &str) {
        self.locks.remove(ri);
    }
}
