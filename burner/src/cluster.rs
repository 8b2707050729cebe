//! The slice of the Kubernetes API consumed by the engine.
use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{DeleteParams, DynamicObject, ListParams, PostParams},
    core::{GroupVersionKind, ObjectMeta},
    discovery::{self, ApiResource},
    Api, Client, ResourceExt,
};
#[cfg(test)]
use mockall::automock;

/// Errors reported by a cluster collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The object or namespace exists already.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The object or namespace does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Discovery found no resource type for a kind.
    #[error("no resource type serves {0}")]
    Discovery(String),
    /// Any other API failure.
    #[error("Kube error: {source}")]
    Api {
        #[from]
        source: kube::Error,
    },
}

/// Define the behavior we consume from the Kubernetes API.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi {
    /// Resolve a kind and version into the resource type that serves it.
    async fn discover(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClusterError>;

    /// Create an object of the given resource type in a namespace.
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<(), ClusterError>;

    /// List every object of the given resource type in a namespace.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    /// Create a namespace with the given labels.
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError>;

    /// Report the names of all namespaces matching a label selector.
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<String>, ClusterError>;

    /// Delete a namespace by name.
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Look up a namespace by name.
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
}

/// [`ClusterApi`] backed by a real API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

// Translate API status reasons into the conditions callers recover from.
fn classify(err: kube::Error, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(resp) if resp.reason == "AlreadyExists" => {
            ClusterError::AlreadyExists(name.to_owned())
        }
        kube::Error::Api(resp) if resp.reason == "NotFound" => {
            ClusterError::NotFound(name.to_owned())
        }
        err => ClusterError::Api { source: err },
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn discover(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ClusterError> {
        match discovery::pinned_kind(&self.client, gvk).await {
            Ok((resource, _caps)) => Ok(resource),
            Err(kube::Error::Discovery(err)) => Err(ClusterError::Discovery(format!(
                "{}/{} {}: {err}",
                gvk.group, gvk.version, gvk.kind
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<(), ClusterError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        api.create(&PostParams::default(), object)
            .await
            .map_err(|err| classify(err, &object.name_any()))?;
        Ok(())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            ..Default::default()
        };
        namespaces
            .create(&PostParams::default(), &namespace)
            .await
            .map_err(|err| classify(err, name))?;
        Ok(())
    }

    async fn list_namespaces(&self, selector: &str) -> Result<Vec<String>, ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|err| classify(err, name))?;
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces.get(name).await.map_err(|err| classify(err, name))
    }
}
