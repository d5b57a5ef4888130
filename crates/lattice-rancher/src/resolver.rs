//! Cluster and project identifier resolution
//!
//! Maps a downstream cluster's display name to its management cluster ID
//! (`c-m-xxxxx`) and a project display name to its project ID (`p-xxxxx`).
//! Both lookups are read-through cached and retried with bounded backoff.
//!
//! Two concurrent misses for the same key may both call the backend and both
//! write the cache. The reads are idempotent and the writes carry the same
//! value, so no single-flight coordination is done.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::DynamicObject;
use lattice_common::{
    retry_with_backoff, CacheType, LookupErrorKind, LookupKind, RetryConfig, RetryError,
    WebhookMetrics,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{RancherBackend, RancherResource};
use crate::cache::{EvictionTask, ProjectKey, ResolverCaches};
use crate::error::{BackendError, LookupError};

/// Namespace holding provisioning clusters
pub const CLUSTER_NAMESPACE: &str = "fleet-default";

/// Management cluster namespace that always exists; used by the health check
pub const HEALTH_CHECK_PROJECT_NAMESPACE: &str = "local";

/// Retries after the first attempt
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound on any single backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Default time budget of a single backend call
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolution of Rancher identifiers
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Management cluster ID for a cluster display name
    async fn resolve_cluster(
        &self,
        cluster_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError>;

    /// Project ID for a project display name within a management cluster
    async fn resolve_project(
        &self,
        cluster_id: &str,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError>;

    /// Verify the backend is reachable and both collections are readable
    async fn health_check(&self, cancel: &CancellationToken) -> Result<(), LookupError>;
}

/// Resolver tuning
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Backoff policy for every backend call
    pub retry: RetryConfig,
    /// Time budget of a single backend call; an overrun is a retryable timeout
    pub attempt_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: MAX_RETRIES + 1,
                initial_delay: INITIAL_BACKOFF,
                max_delay: MAX_BACKOFF,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Cached, retrying resolver over a [`RancherBackend`]
pub struct RancherResolver {
    backend: Arc<dyn RancherBackend>,
    caches: ResolverCaches,
    metrics: Arc<dyn WebhookMetrics>,
    config: ResolverConfig,
    eviction: Mutex<Option<EvictionTask>>,
}

impl RancherResolver {
    /// Create a resolver and start sweeping `caches` once per cache TTL.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        backend: Arc<dyn RancherBackend>,
        caches: ResolverCaches,
        metrics: Arc<dyn WebhookMetrics>,
        config: ResolverConfig,
    ) -> Self {
        let eviction = EvictionTask::spawn(caches.clone(), caches.clusters.ttl());
        Self {
            backend,
            caches,
            metrics,
            config,
            eviction: Mutex::new(Some(eviction)),
        }
    }

    /// Empty both caches
    pub fn clear_cache(&self) {
        self.caches.clear();
        info!("Cache cleared");
    }

    /// Entry counts as (clusters, projects)
    pub fn cache_stats(&self) -> (usize, usize) {
        self.caches.stats()
    }

    /// Stop the background eviction task
    pub async fn shutdown(&self) {
        let task = self.eviction.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    /// Bound one backend call by the per-attempt timeout
    async fn attempt<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.config.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::timeout(format!(
                "no response within {:?}",
                self.config.attempt_timeout
            ))),
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, RetryError<BackendError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        retry_with_backoff(
            &self.config.retry,
            operation,
            cancel,
            BackendError::is_retryable,
            call,
        )
        .await
    }
}

#[async_trait]
impl IdentifierResolver for RancherResolver {
    async fn resolve_cluster(
        &self,
        cluster_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError> {
        if let Some(cluster_id) = self.caches.clusters.get(&cluster_name.to_string()) {
            debug!(cluster = %cluster_name, cluster_id = %cluster_id, "Cluster ID cache hit");
            self.metrics.record_cache_hit(CacheType::Cluster);
            return Ok(cluster_id);
        }
        self.metrics.record_cache_miss(CacheType::Cluster);

        let fetched = self
            .with_retry("get_cluster", cancel, move || {
                self.attempt(self.backend.get(
                    RancherResource::ProvisioningCluster,
                    CLUSTER_NAMESPACE,
                    cluster_name,
                ))
            })
            .await;

        let cluster = match fetched {
            Ok(cluster) => cluster,
            Err(RetryError::Cancelled { .. }) => {
                self.metrics
                    .record_lookup_error(LookupKind::Cluster, LookupErrorKind::Api);
                return Err(LookupError::Cancelled {
                    operation: format!("cluster lookup for {cluster_name}"),
                });
            }
            Err(RetryError::Failed { attempts, error }) => {
                warn!(cluster = %cluster_name, attempts, error = %error, "Cluster lookup failed");
                self.metrics
                    .record_lookup_error(LookupKind::Cluster, LookupErrorKind::Api);
                return Err(LookupError::ClusterApi {
                    cluster: cluster_name.to_string(),
                    source: error,
                });
            }
        };

        let Some(cluster_id) = management_cluster_id(&cluster) else {
            self.metrics
                .record_lookup_error(LookupKind::Cluster, LookupErrorKind::NotFound);
            return Err(LookupError::ClusterIdMissing {
                cluster: cluster_name.to_string(),
            });
        };

        self.caches
            .clusters
            .insert(cluster_name.to_string(), cluster_id.clone());
        debug!(
            cluster = %cluster_name,
            cluster_id = %cluster_id,
            ttl = ?self.caches.clusters.ttl(),
            "Cluster ID cached"
        );

        Ok(cluster_id)
    }

    async fn resolve_project(
        &self,
        cluster_id: &str,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError> {
        let key = ProjectKey::new(cluster_id, display_name);
        if let Some(project_id) = self.caches.projects.get(&key) {
            debug!(
                cluster_id = %cluster_id,
                project = %display_name,
                project_id = %project_id,
                "Project ID cache hit"
            );
            self.metrics.record_cache_hit(CacheType::Project);
            return Ok(project_id);
        }
        self.metrics.record_cache_miss(CacheType::Project);

        let listed = self
            .with_retry("list_projects", cancel, move || {
                self.attempt(self.backend.list(RancherResource::Project, cluster_id, None))
            })
            .await;

        let projects = match listed {
            Ok(projects) => projects,
            Err(RetryError::Cancelled { .. }) => {
                self.metrics
                    .record_lookup_error(LookupKind::Project, LookupErrorKind::Api);
                return Err(LookupError::Cancelled {
                    operation: format!("project lookup for {display_name}"),
                });
            }
            Err(RetryError::Failed { attempts, error }) => {
                warn!(
                    cluster_id = %cluster_id,
                    project = %display_name,
                    attempts,
                    error = %error,
                    "Project lookup failed"
                );
                self.metrics
                    .record_lookup_error(LookupKind::Project, LookupErrorKind::Api);
                return Err(LookupError::ProjectApi {
                    cluster_id: cluster_id.to_string(),
                    source: error,
                });
            }
        };

        let Some(project_id) = find_project_id(&projects, display_name) else {
            self.metrics
                .record_lookup_error(LookupKind::Project, LookupErrorKind::NotFound);
            return Err(LookupError::ProjectNotFound {
                cluster_id: cluster_id.to_string(),
                project: display_name.to_string(),
            });
        };

        self.caches.projects.insert(key, project_id.clone());
        debug!(
            cluster_id = %cluster_id,
            project = %display_name,
            project_id = %project_id,
            ttl = ?self.caches.projects.ttl(),
            "Project ID cached"
        );

        Ok(project_id)
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<(), LookupError> {
        let targets = [
            (RancherResource::ProvisioningCluster, CLUSTER_NAMESPACE),
            (RancherResource::Project, HEALTH_CHECK_PROJECT_NAMESPACE),
        ];

        for (resource, namespace) in targets {
            let listed = self
                .with_retry("health_check", cancel, move || {
                    self.attempt(self.backend.list(resource, namespace, Some(1)))
                })
                .await;

            match listed {
                Ok(_) => {}
                Err(RetryError::Cancelled { .. }) => {
                    return Err(LookupError::Cancelled {
                        operation: format!("health check of {}", resource.qualified_name()),
                    });
                }
                Err(RetryError::Failed { error, .. }) => {
                    return Err(LookupError::HealthCheck {
                        resource: resource.qualified_name().to_string(),
                        source: error,
                    });
                }
            }
        }

        Ok(())
    }
}

/// `status.clusterName` of a provisioning cluster, if set
fn management_cluster_id(cluster: &DynamicObject) -> Option<String> {
    cluster
        .data
        .get("status")
        .and_then(|status| status.get("clusterName"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Name of the first project, in list order, whose `spec.displayName` matches
fn find_project_id(projects: &[DynamicObject], display_name: &str) -> Option<String> {
    projects
        .iter()
        .filter(|project| {
            project
                .data
                .get("spec")
                .and_then(|spec| spec.get("displayName"))
                .and_then(Value::as_str)
                == Some(display_name)
        })
        .find_map(|project| project.metadata.name.clone())
}
