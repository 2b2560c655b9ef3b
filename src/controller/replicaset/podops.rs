//! Concurrent pod creation, deletion and unlabelling
//!
//! Every planned operation is attempted; failures are collected instead of
//! short-circuiting the remaining ones.

use super::snapshot::Snapshot;
use crate::controller::podtemplate::build_pod;
use crate::controller::store::ClusterStore;
use crate::crd::keys::LABEL_CANARY;
use crate::crd::replicaset::ExtendedDaemonSetReplicaSet;
use futures::future::join_all;
use tracing::{debug, warn};

/// Outcome of one batch of pod operations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PodOpsOutcome {
    pub succeeded: usize,
    pub errors: Vec<String>,
}

impl PodOpsOutcome {
    fn collect(results: Vec<Result<(), String>>) -> Self {
        let mut outcome = PodOpsOutcome::default();
        for result in results {
            match result {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => outcome.errors.push(e),
            }
        }
        outcome
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Create one pod per node in `node_names`
pub async fn create_pods(
    store: &dyn ClusterStore,
    namespace: &str,
    ers: &ExtendedDaemonSetReplicaSet,
    snapshot: &Snapshot,
    node_names: &[String],
    canary: bool,
) -> PodOpsOutcome {
    let results = join_all(node_names.iter().map(|node_name| async move {
        let pod = build_pod(ers, node_name, snapshot.setting(node_name), canary)
            .map_err(|e| format!("node {}: {}", node_name, e))?;
        store
            .create_pod(namespace, &pod)
            .await
            .map(|created| {
                debug!(node = %node_name, pod = ?created.metadata.name, "Created pod");
            })
            .map_err(|e| format!("node {}: {}", node_name, e))
    }))
    .await;
    PodOpsOutcome::collect(results)
}

/// Delete the named pods
pub async fn delete_pods(store: &dyn ClusterStore, namespace: &str, names: &[String]) -> PodOpsOutcome {
    let results = join_all(names.iter().map(|name| async move {
        store
            .delete_pod(namespace, name)
            .await
            .map(|()| debug!(pod = %name, "Deleted pod"))
            .map_err(|e| format!("pod {}: {}", name, e))
    }))
    .await;
    PodOpsOutcome::collect(results)
}

/// Strip the canary label from the named pods, best-effort
pub async fn unlabel_pods(store: &dyn ClusterStore, namespace: &str, names: &[String]) {
    let results = join_all(
        names
            .iter()
            .map(|name| async move { (name, store.remove_pod_label(namespace, name, LABEL_CANARY).await) }),
    )
    .await;
    for (name, result) in results {
        if let Err(e) = result {
            warn!(pod = %name, error = %e, "Failed to remove canary label");
        }
    }
}
