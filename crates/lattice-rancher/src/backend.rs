//! Remote access to Rancher resources
//!
//! The resolver only needs two reads: fetch one object by name, and list the
//! objects of a namespace. [`RancherBackend`] captures exactly that so tests
//! can substitute an in-process fake; [`KubeBackend`] is the production
//! implementation over the Kubernetes dynamic API.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::error::BackendError;

/// Rancher resource collections the resolver reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RancherResource {
    /// `clusters.provisioning.cattle.io/v1`
    ProvisioningCluster,
    /// `projects.management.cattle.io/v3`
    Project,
}

impl RancherResource {
    /// Dynamic API descriptor for this collection
    pub fn api_resource(self) -> ApiResource {
        match self {
            RancherResource::ProvisioningCluster => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk("provisioning.cattle.io", "v1", "Cluster"),
                "clusters",
            ),
            RancherResource::Project => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk("management.cattle.io", "v3", "Project"),
                "projects",
            ),
        }
    }

    /// Fully qualified resource name, for messages
    pub fn qualified_name(self) -> &'static str {
        match self {
            RancherResource::ProvisioningCluster => "clusters.provisioning.cattle.io",
            RancherResource::Project => "projects.management.cattle.io",
        }
    }
}

/// Read access to Rancher resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RancherBackend: Send + Sync {
    /// Fetch a single object by name
    async fn get(
        &self,
        resource: RancherResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, BackendError>;

    /// List objects in a namespace, in the order the API server returns them
    async fn list(
        &self,
        resource: RancherResource,
        namespace: &str,
        limit: Option<u32>,
    ) -> Result<Vec<DynamicObject>, BackendError>;
}

/// [`RancherBackend`] over the Kubernetes dynamic API
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: RancherResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &resource.api_resource())
    }
}

#[async_trait]
impl RancherBackend for KubeBackend {
    async fn get(
        &self,
        resource: RancherResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, BackendError> {
        Ok(self.api(resource, namespace).get(name).await?)
    }

    async fn list(
        &self,
        resource: RancherResource,
        namespace: &str,
        limit: Option<u32>,
    ) -> Result<Vec<DynamicObject>, BackendError> {
        let mut params = ListParams::default();
        if let Some(limit) = limit {
            params = params.limit(limit);
        }
        let list = self.api(resource, namespace).list(&params).await?;
        Ok(list.items)
    }
}
