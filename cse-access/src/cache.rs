//! Decision cache for access-control checks, ported from the teacher's
//! OpenFGA decision cache (same lazy-eviction, fail-open-when-full design)
//! and re-keyed to `(originator, resource, operation)` triples (spec §4.3).

use cse_model::Operation;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: usize = 10_000;
const EVICTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub originator: String,
    pub resource_ri: String,
    pub operation: u8,
}

impl CacheKey {
    pub fn new(originator: &str, resource_ri: &str, operation: Operation) -> Self {
        CacheKey {
            originator: originator.to_string(),
            resource_ri: resource_ri.to_string(),
            operation: operation.bit() as u8,
        }
    }
}

struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

/// Thread-safe decision cache with TTL and maximum capacity. When full,
/// expired entries are evicted first; if still full, new entries are
/// silently dropped and the evaluator falls through to a fresh check
/// (fail-open, never fail-closed on cache pressure).
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedDecision>,
    ttl: Duration,
    max_entries: usize,
    len: AtomicUsize,
    last_eviction: std::sync::Mutex<Instant>,
}

impl DecisionCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_capacity(ttl_secs, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl_secs: u64, max_entries: usize) -> Self {
        DecisionCache {
            entries: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            len: AtomicUsize::new(0),
            last_eviction: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.allowed)
            } else {
                None
            }
        })
    }

    pub fn set(&self, key: CacheKey, allowed: bool) {
        self.maybe_evict();
        if self.len.load(Ordering::Relaxed) >= self.max_entries {
            self.evict_expired();
            if self.len.load(Ordering::Relaxed) >= self.max_entries {
                return;
            }
        }
        let was_absent = self
            .entries
            .insert(key, CachedDecision { allowed, expires_at: Instant::now() + self.ttl })
            .is_none();
        if was_absent {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Invalidate every cached decision that references `resource_ri` — an
    /// ACP or a governed resource, either way stale after an update.
    pub fn invalidate_resource(&self, resource_ri: &str) {
        self.entries.retain(|k, _| {
            let keep = k.resource_ri != resource_ri;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.len.store(0, Ordering::Relaxed);
    }

    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, v| {
            let keep = v.expires_at > now;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
        if let Ok(mut last) = self.last_eviction.lock() {
            *last = Instant::now();
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_evict(&self) {
        let should_evict = self
            .last_eviction
            .lock()
            .map(|last| last.elapsed() >= EVICTION_CHECK_INTERVAL)
            .unwrap_or(false);
        if should_evict {
            self.evict_expired();
        }
    }
}
