//! TTL caches for resolved identifiers
//!
//! Entries are immutable once inserted and valid while `now < expires_at`.
//! Reads always re-check expiry, so the background sweep only reclaims
//! memory and never affects what a reader sees.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Expiry used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Longest pause between eviction sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Read-through cache with a fixed time-to-live per entry
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` if present and not yet expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, expiring one TTL from now
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now
                .checked_add(self.ttl)
                .unwrap_or_else(|| now + FAR_FUTURE),
        };
        self.entries.write().insert(key, entry);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        *self.entries.write() = HashMap::new();
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key of the project cache: unique per (cluster ID, display name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey {
    /// Management cluster ID
    pub cluster_id: String,
    /// Project display name
    pub display_name: String,
}

impl ProjectKey {
    /// Build a key from its parts
    pub fn new(cluster_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// The two resolver caches, each behind its own lock
#[derive(Debug, Clone)]
pub struct ResolverCaches {
    /// Cluster display name -> management cluster ID
    pub clusters: Arc<TtlCache<String, String>>,
    /// (cluster ID, project display name) -> project ID
    pub projects: Arc<TtlCache<ProjectKey, String>>,
}

impl ResolverCaches {
    /// Create both caches with the same TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            clusters: Arc::new(TtlCache::new(ttl)),
            projects: Arc::new(TtlCache::new(ttl)),
        }
    }

    /// Sweep expired entries from both caches
    pub fn evict_expired(&self) -> (usize, usize) {
        (
            self.clusters.evict_expired(),
            self.projects.evict_expired(),
        )
    }

    /// Empty both caches
    pub fn clear(&self) {
        self.clusters.clear();
        self.projects.clear();
    }

    /// Entry counts as (clusters, projects)
    pub fn stats(&self) -> (usize, usize) {
        (self.clusters.len(), self.projects.len())
    }
}

/// Periodic sweep of expired cache entries
///
/// The task runs until [`EvictionTask::shutdown`] is called or the guard is
/// dropped.
pub struct EvictionTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl EvictionTask {
    /// Start sweeping `caches` every `interval`, or daily if `interval` is
    /// longer. Must be called within a tokio runtime. A zero interval starts
    /// nothing.
    pub fn spawn(caches: ResolverCaches, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        if interval.is_zero() {
            return Self {
                cancel,
                handle: None,
            };
        }

        let interval = interval.min(MAX_SWEEP_INTERVAL);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let (clusters, projects) = caches.evict_expired();
                        if clusters + projects > 0 {
                            debug!(clusters, projects, "Evicted expired cache entries");
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the sweep and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Whether the sweep task is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EvictionTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
