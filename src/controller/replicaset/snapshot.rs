//! Node and pod snapshot of one replica set pass

use crate::controller::error::ReconcileError;
use crate::controller::podtemplate::{compute_setting_hash, find_setting_for_node, synthetic_pod};
use crate::controller::podutil::pod_node_name;
use crate::controller::scheduler::node_fits;
use crate::controller::strategies::NodeState;
use crate::crd::replicaset::ExtendedDaemonSetReplicaSet;
use crate::crd::setting::ExtendedDaemonSetSetting;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;

/// Eligible nodes with their pods, plus the pods that have no eligible node
#[derive(Debug, Default)]
pub struct Snapshot {
    pub nodes: BTreeMap<String, NodeState>,
    pub orphan_pods: Vec<Pod>,
    /// Setting applied on each node that has one
    pub settings: BTreeMap<String, ExtendedDaemonSetSetting>,
}

impl Snapshot {
    pub fn setting(&self, node_name: &str) -> Option<&ExtendedDaemonSetSetting> {
        self.settings.get(node_name)
    }
}

/// Group the daemon set's pods by node
///
/// A node is eligible when a pod built from the replica set template fits on it.
/// Pods bound to a node that is gone or no longer eligible are orphans.
pub fn build_snapshot(
    ers: &ExtendedDaemonSetReplicaSet,
    eds_name: &str,
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    settings: &[ExtendedDaemonSetSetting],
) -> Result<Snapshot, ReconcileError> {
    let probe = synthetic_pod(&ers.spec.template);
    let mut snapshot = Snapshot::default();

    for node in nodes {
        let Some(name) = node.metadata.name.clone() else {
            continue;
        };
        if !node_fits(&probe, &node) {
            continue;
        }
        let setting = find_setting_for_node(settings, eds_name, &node).cloned();
        let override_hash = setting.as_ref().map(compute_setting_hash).transpose()?;
        if let Some(setting) = setting {
            snapshot.settings.insert(name.clone(), setting);
        }
        snapshot.nodes.insert(
            name,
            NodeState {
                node,
                override_hash,
                pods: Vec::new(),
            },
        );
    }

    for pod in pods {
        match pod_node_name(&pod).and_then(|n| snapshot.nodes.get_mut(&n)) {
            Some(state) => state.pods.push(pod),
            None => snapshot.orphan_pods.push(pod),
        }
    }

    Ok(snapshot)
}
