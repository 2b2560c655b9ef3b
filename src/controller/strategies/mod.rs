//! Per-role replica set strategies
//!
//! The owning ExtendedDaemonSet decides the role of every replica set; each role has
//! one handler that turns a snapshot of nodes and pods into planned pod actions and a
//! new status:
//! - `rolling`: the active replica set, rate-limited node-by-node replacement
//! - `canary`: the canary replica set, restricted to the canary nodes
//! - `unknown`: outdated replica sets, status only

pub mod canary;
pub mod rolling;
pub mod unknown;

use crate::controller::intstr::IntOrPercentError;
use crate::controller::podutil::{
    is_pod_terminating, pod_node_override_hash, pod_template_hash,
};
use crate::crd::daemonset::ExtendedDaemonSet;
use crate::crd::replicaset::{
    ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetStatus, ReplicaSetRole,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Requeue interval while pods are still converging
pub const REQUEUE_CONVERGING: Duration = Duration::from_secs(5);

/// Errors specific to strategy evaluation
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Invalid rolling update configuration: {0}")]
    InvalidRollingUpdate(#[from] IntOrPercentError),
}

/// A node eligible for the daemon set and the daemon set's pods bound to it
#[derive(Debug, Clone)]
pub struct NodeState {
    pub node: Node,
    /// Override hash a pod built for this node would carry
    pub override_hash: Option<String>,
    pub pods: Vec<Pod>,
}

/// Immutable snapshot a strategy works on
pub struct StrategyParams<'a> {
    pub eds: &'a ExtendedDaemonSet,
    pub replicaset: &'a ExtendedDaemonSetReplicaSet,
    /// Eligible nodes, keyed by node name
    pub nodes: &'a BTreeMap<String, NodeState>,
    /// Pods of the daemon set on nodes that are gone or no longer eligible
    pub orphan_pods: &'a [Pod],
    pub now: DateTime<Utc>,
}

/// Planned actions and new status produced by a strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyResult {
    /// Nodes that get a new pod
    pub pods_to_create: Vec<String>,
    /// Names of pods to delete
    pub pods_to_delete: Vec<String>,
    /// Names of pods whose canary label is removed
    pub pods_to_unlabel: Vec<String>,
    pub status: ExtendedDaemonSetReplicaSetStatus,
    pub is_paused: bool,
    pub paused_reason: Option<String>,
    pub is_failed: bool,
    pub failed_reason: Option<String>,
    pub requeue_after: Option<Duration>,
}

/// Run the handler for `role`
pub fn manage_deployment(
    role: ReplicaSetRole,
    params: &StrategyParams<'_>,
) -> Result<StrategyResult, StrategyError> {
    match role {
        ReplicaSetRole::Active => rolling::manage_deployment(params),
        ReplicaSetRole::Canary => Ok(canary::manage_deployment(params)),
        ReplicaSetRole::Unknown => Ok(unknown::manage_deployment(params)),
    }
}

/// Role of `ers` as recorded on its owning daemon set's status
pub fn replicaset_role(eds: &ExtendedDaemonSet, ers: &ExtendedDaemonSetReplicaSet) -> ReplicaSetRole {
    let name = ers.name_any();
    let Some(status) = eds.status.as_ref() else {
        return ReplicaSetRole::Unknown;
    };
    if status
        .canary
        .as_ref()
        .map(|c| c.replica_set == name)
        .unwrap_or(false)
    {
        return ReplicaSetRole::Canary;
    }
    if status.active_replica_set.as_deref() == Some(name.as_str()) {
        return ReplicaSetRole::Active;
    }
    ReplicaSetRole::Unknown
}

/// Names of the nodes currently running the canary of `eds`
pub fn canary_node_names(eds: &ExtendedDaemonSet) -> Vec<String> {
    eds.status
        .as_ref()
        .and_then(|s| s.canary.as_ref())
        .map(|c| c.nodes.clone())
        .unwrap_or_default()
}

/// Pods of one node split against a replica set
pub(crate) struct NodePods<'a> {
    /// Pods matching the template and override hash
    pub current: Vec<&'a Pod>,
    /// Pods from another template or override
    pub outdated: Vec<&'a Pod>,
    /// A pod of the node is being deleted
    pub terminating: bool,
}

/// True if `pod` was built from `ers` with the override expected on its node
pub(crate) fn is_pod_current(
    pod: &Pod,
    ers: &ExtendedDaemonSetReplicaSet,
    override_hash: Option<&str>,
) -> bool {
    pod_template_hash(pod) == Some(ers.spec.template_generation.as_str())
        && pod_node_override_hash(pod) == override_hash
}

pub(crate) fn classify_pods<'a>(
    state: &'a NodeState,
    ers: &ExtendedDaemonSetReplicaSet,
) -> NodePods<'a> {
    let mut pods = NodePods {
        current: Vec::new(),
        outdated: Vec::new(),
        terminating: false,
    };
    for pod in &state.pods {
        if is_pod_terminating(pod) {
            pods.terminating = true;
        } else if is_pod_current(pod, ers, state.override_hash.as_deref()) {
            pods.current.push(pod);
        } else {
            pods.outdated.push(pod);
        }
    }
    // Oldest first, so duplicates are trimmed from the newest
    pods.current
        .sort_by_key(|p| crate::controller::podutil::pod_start_time(p));
    pods
}

/// True when the node reports Ready
pub(crate) fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false)
}
