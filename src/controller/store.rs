//! Cluster store
//!
//! Every read and write the reconcilers perform goes through `ClusterStore`.
//! Production uses `KubeStore` over `kube::Api` and the watch caches; tests use the
//! in-memory `MockStore`.

use crate::controller::cache::ReadCaches;
use crate::crd::daemonset::{ExtendedDaemonSet, ExtendedDaemonSetStatus};
use crate::crd::keys::LABEL_EDS_NAME;
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetStatus};
use crate::crd::setting::ExtendedDaemonSetSetting;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    KubeError(kube::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict updating {0}")]
    Conflict(String),

    #[error("Failed to serialize object: {0}")]
    SerializationError(String),
}

/// Read/write access to the objects the controllers manage
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_daemonset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ExtendedDaemonSet, StoreError>;

    /// Replica sets labelled with the daemon set name
    async fn list_replicasets(
        &self,
        namespace: &str,
        eds_name: &str,
    ) -> Result<Vec<ExtendedDaemonSetReplicaSet>, StoreError>;

    async fn create_replicaset(
        &self,
        namespace: &str,
        ers: &ExtendedDaemonSetReplicaSet,
    ) -> Result<ExtendedDaemonSetReplicaSet, StoreError>;

    async fn delete_replicaset(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Write the status subresource, returning the updated object
    async fn replace_daemonset_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExtendedDaemonSetStatus,
    ) -> Result<ExtendedDaemonSet, StoreError>;

    /// Full object replace; fails with Conflict if `resourceVersion` is stale
    async fn replace_daemonset(
        &self,
        eds: &ExtendedDaemonSet,
    ) -> Result<ExtendedDaemonSet, StoreError>;

    async fn replace_replicaset_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExtendedDaemonSetReplicaSetStatus,
    ) -> Result<ExtendedDaemonSetReplicaSet, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Pods labelled with the daemon set name
    async fn list_pods(&self, namespace: &str, eds_name: &str) -> Result<Vec<Pod>, StoreError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, StoreError>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn remove_pod_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<(), StoreError>;

    async fn list_settings(
        &self,
        namespace: &str,
    ) -> Result<Vec<ExtendedDaemonSetSetting>, StoreError>;
}

fn map_kube_error(what: String, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(what),
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(what),
        other => StoreError::KubeError(other),
    }
}

/// Merge patch body for a status subresource
///
/// Optional fields skipped by serde are sent as explicit nulls so clearing them
/// reaches the API server.
fn status_patch<S: serde::Serialize>(status: &S, nullable: &[&str]) -> Result<Value, StoreError> {
    let mut value =
        serde_json::to_value(status).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        for key in nullable {
            map.entry(key.to_string()).or_insert(Value::Null);
        }
    }
    Ok(json!({ "status": value }))
}

const EDS_NULLABLE_STATUS: &[&str] = &["state", "activeReplicaSet", "canary", "reason", "conditions"];
const ERS_NULLABLE_STATUS: &[&str] = &["conditions"];

/// `ClusterStore` backed by the Kubernetes API
///
/// Nodes, pods and settings are served from the watch caches; daemon sets and
/// replica sets are read from the API server so rollout decisions see the latest
/// resourceVersion.
pub struct KubeStore {
    client: Client,
    caches: ReadCaches,
}

impl KubeStore {
    pub fn new(client: Client, caches: ReadCaches) -> Self {
        Self { client, caches }
    }

    fn daemonsets(&self, namespace: &str) -> Api<ExtendedDaemonSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn replicasets(&self, namespace: &str) -> Api<ExtendedDaemonSetReplicaSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_daemonset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ExtendedDaemonSet, StoreError> {
        self.daemonsets(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(format!("ExtendedDaemonSet {}/{}", namespace, name), e))
    }

    async fn list_replicasets(
        &self,
        namespace: &str,
        eds_name: &str,
    ) -> Result<Vec<ExtendedDaemonSetReplicaSet>, StoreError> {
        let lp = ListParams::default().labels(&format!("{}={}", LABEL_EDS_NAME, eds_name));
        self.replicasets(namespace)
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(StoreError::KubeError)
    }

    async fn create_replicaset(
        &self,
        namespace: &str,
        ers: &ExtendedDaemonSetReplicaSet,
    ) -> Result<ExtendedDaemonSetReplicaSet, StoreError> {
        self.replicasets(namespace)
            .create(&PostParams::default(), ers)
            .await
            .map_err(|e| {
                map_kube_error(
                    format!("ExtendedDaemonSetReplicaSet {}/{}", namespace, ers.name_any()),
                    e,
                )
            })
    }

    async fn delete_replicaset(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .replicasets(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!(replicaset = ?name, "ExtendedDaemonSetReplicaSet already deleted");
                Ok(())
            }
            Err(e) => Err(StoreError::KubeError(e)),
        }
    }

    async fn replace_daemonset_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExtendedDaemonSetStatus,
    ) -> Result<ExtendedDaemonSet, StoreError> {
        let patch = status_patch(status, EDS_NULLABLE_STATUS)?;
        self.daemonsets(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(format!("ExtendedDaemonSet {}/{}", namespace, name), e))
    }

    async fn replace_daemonset(
        &self,
        eds: &ExtendedDaemonSet,
    ) -> Result<ExtendedDaemonSet, StoreError> {
        let namespace = eds.namespace().unwrap_or_default();
        let name = eds.name_any();
        self.daemonsets(&namespace)
            .replace(&name, &PostParams::default(), eds)
            .await
            .map_err(|e| map_kube_error(format!("ExtendedDaemonSet {}/{}", namespace, name), e))
    }

    async fn replace_replicaset_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExtendedDaemonSetReplicaSetStatus,
    ) -> Result<ExtendedDaemonSetReplicaSet, StoreError> {
        let patch = status_patch(status, ERS_NULLABLE_STATUS)?;
        self.replicasets(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                map_kube_error(
                    format!("ExtendedDaemonSetReplicaSet {}/{}", namespace, name),
                    e,
                )
            })
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.caches.nodes())
    }

    async fn list_pods(&self, namespace: &str, eds_name: &str) -> Result<Vec<Pod>, StoreError> {
        Ok(self.caches.pods(namespace, eds_name))
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, StoreError> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(StoreError::KubeError)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(StoreError::KubeError(e)),
        }
    }

    async fn remove_pod_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let patch = json!({ "metadata": { "labels": { key: Value::Null } } });
        self.pods(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(format!("Pod {}/{}", namespace, name), e))
    }

    async fn list_settings(
        &self,
        namespace: &str,
    ) -> Result<Vec<ExtendedDaemonSetSetting>, StoreError> {
        Ok(self.caches.settings(namespace))
    }
}

#[cfg(test)]
pub use mock::MockStore;
