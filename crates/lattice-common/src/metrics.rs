//! Metrics for the project webhook
//!
//! Metrics flow through the [`WebhookMetrics`] sink, which is handed to the
//! resolver and the HTTP layer at construction time. Two implementations:
//! - [`OtelMetrics`] records OpenTelemetry instruments on a [`Meter`]
//! - [`InMemoryMetrics`] keeps plain counters, for tests and introspection

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use parking_lot::Mutex;

/// Outcome label attached to every admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionStatus {
    /// Admitted without annotation after a tolerated lookup failure
    Allowed,
    /// Rejected after a lookup failure in strict mode
    Denied,
    /// Malformed input or an internal failure
    Error,
    /// Nothing to do for this object
    Skipped,
    /// Admitted with a patch
    Mutated,
    /// Patch computed but withheld
    DryRun,
}

impl DecisionStatus {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Allowed => "allowed",
            DecisionStatus::Denied => "denied",
            DecisionStatus::Error => "error",
            DecisionStatus::Skipped => "skipped",
            DecisionStatus::Mutated => "mutated",
            DecisionStatus::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resolver cache served (or missed) a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Cluster name -> cluster ID
    Cluster,
    /// (cluster ID, project display name) -> project ID
    Project,
}

impl CacheType {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Cluster => "cluster",
            CacheType::Project => "project",
        }
    }
}

/// Which lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// Cluster ID resolution
    Cluster,
    /// Project ID resolution
    Project,
}

/// Failure category of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupErrorKind {
    /// The backend answered, but the identifier does not exist
    NotFound,
    /// The backend call itself failed
    Api,
}

impl LookupErrorKind {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupErrorKind::NotFound => "not_found",
            LookupErrorKind::Api => "api_error",
        }
    }
}

/// Sink for webhook and resolver metrics
pub trait WebhookMetrics: Send + Sync {
    /// Record one admission request and how long it took
    fn record_request(&self, operation: &str, status: DecisionStatus, duration: Duration);

    /// Record a cache hit
    fn record_cache_hit(&self, cache: CacheType);

    /// Record a cache miss
    fn record_cache_miss(&self, cache: CacheType);

    /// Record a failed lookup
    fn record_lookup_error(&self, lookup: LookupKind, kind: LookupErrorKind);
}

// ============================================================================
// OpenTelemetry
// ============================================================================

/// OpenTelemetry-backed metrics
///
/// Instruments:
/// - `project_webhook_requests_total` (`operation`, `status`)
/// - `project_webhook_request_duration_seconds` (`operation`)
/// - `project_webhook_cache_hits_total` / `_misses_total` (`cache_type`)
/// - `project_webhook_cluster_lookup_errors_total` (`error_type`)
/// - `project_webhook_project_lookup_errors_total` (`error_type`)
pub struct OtelMetrics {
    requests: Counter<u64>,
    request_duration: Histogram<f64>,
    cache_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    cluster_lookup_errors: Counter<u64>,
    project_lookup_errors: Counter<u64>,
}

impl OtelMetrics {
    /// Build all instruments on the given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("project_webhook_requests_total")
                .with_description("Total number of webhook requests")
                .with_unit("{requests}")
                .build(),
            request_duration: meter
                .f64_histogram("project_webhook_request_duration_seconds")
                .with_description("Duration of webhook request processing in seconds")
                .with_unit("s")
                .build(),
            cache_hits: meter
                .u64_counter("project_webhook_cache_hits_total")
                .with_description("Total number of cache hits")
                .with_unit("{hits}")
                .build(),
            cache_misses: meter
                .u64_counter("project_webhook_cache_misses_total")
                .with_description("Total number of cache misses")
                .with_unit("{misses}")
                .build(),
            cluster_lookup_errors: meter
                .u64_counter("project_webhook_cluster_lookup_errors_total")
                .with_description("Total number of cluster lookup errors")
                .with_unit("{errors}")
                .build(),
            project_lookup_errors: meter
                .u64_counter("project_webhook_project_lookup_errors_total")
                .with_description("Total number of project lookup errors")
                .with_unit("{errors}")
                .build(),
        }
    }
}

impl WebhookMetrics for OtelMetrics {
    fn record_request(&self, operation: &str, status: DecisionStatus, duration: Duration) {
        self.requests.add(
            1,
            &[
                KeyValue::new("operation", operation.to_string()),
                KeyValue::new("status", status.as_str()),
            ],
        );
        self.request_duration.record(
            duration.as_secs_f64(),
            &[KeyValue::new("operation", operation.to_string())],
        );
    }

    fn record_cache_hit(&self, cache: CacheType) {
        self.cache_hits
            .add(1, &[KeyValue::new("cache_type", cache.as_str())]);
    }

    fn record_cache_miss(&self, cache: CacheType) {
        self.cache_misses
            .add(1, &[KeyValue::new("cache_type", cache.as_str())]);
    }

    fn record_lookup_error(&self, lookup: LookupKind, kind: LookupErrorKind) {
        let counter = match lookup {
            LookupKind::Cluster => &self.cluster_lookup_errors,
            LookupKind::Project => &self.project_lookup_errors,
        };
        counter.add(1, &[KeyValue::new("error_type", kind.as_str())]);
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Counters kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    requests: Mutex<HashMap<(String, DecisionStatus), u64>>,
    cluster_cache_hits: AtomicU64,
    cluster_cache_misses: AtomicU64,
    project_cache_hits: AtomicU64,
    project_cache_misses: AtomicU64,
    lookup_errors: Mutex<HashMap<(LookupKind, LookupErrorKind), u64>>,
}

impl InMemoryMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests recorded for an operation/status pair
    pub fn requests(&self, operation: &str, status: DecisionStatus) -> u64 {
        self.requests
            .lock()
            .get(&(operation.to_string(), status))
            .copied()
            .unwrap_or(0)
    }

    /// Cache hits recorded for a cache
    pub fn cache_hits(&self, cache: CacheType) -> u64 {
        match cache {
            CacheType::Cluster => self.cluster_cache_hits.load(Ordering::Relaxed),
            CacheType::Project => self.project_cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Cache misses recorded for a cache
    pub fn cache_misses(&self, cache: CacheType) -> u64 {
        match cache {
            CacheType::Cluster => self.cluster_cache_misses.load(Ordering::Relaxed),
            CacheType::Project => self.project_cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Lookup errors recorded for a lookup/kind pair
    pub fn lookup_errors(&self, lookup: LookupKind, kind: LookupErrorKind) -> u64 {
        self.lookup_errors
            .lock()
            .get(&(lookup, kind))
            .copied()
            .unwrap_or(0)
    }
}

impl WebhookMetrics for InMemoryMetrics {
    fn record_request(&self, operation: &str, status: DecisionStatus, _duration: Duration) {
        *self
            .requests
            .lock()
            .entry((operation.to_string(), status))
            .or_default() += 1;
    }

    fn record_cache_hit(&self, cache: CacheType) {
        match cache {
            CacheType::Cluster => self.cluster_cache_hits.fetch_add(1, Ordering::Relaxed),
            CacheType::Project => self.project_cache_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_cache_miss(&self, cache: CacheType) {
        match cache {
            CacheType::Cluster => self.cluster_cache_misses.fetch_add(1, Ordering::Relaxed),
            CacheType::Project => self.project_cache_misses.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_lookup_error(&self, lookup: LookupKind, kind: LookupErrorKind) {
        *self.lookup_errors.lock().entry((lookup, kind)).or_default() += 1;
    }
}
