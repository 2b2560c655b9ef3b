//! Replica sets that are neither active nor canary
//!
//! They only report how many of their pods are still around; the active replica set
//! replaces those pods and the daemon set reconciler deletes the replica set once it
//! is empty.

use super::{StrategyParams, StrategyResult};
use crate::controller::conditions::update_condition;
use crate::controller::podutil::{is_pod_available, is_pod_ready, pod_template_hash};
use crate::crd::condition::ConditionType;
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSetStatus, ReplicaSetRole};

pub fn manage_deployment(params: &StrategyParams<'_>) -> StrategyResult {
    let ers = params.replicaset;
    let now = params.now;
    let hash = ers.spec.template_generation.as_str();

    let pods = params
        .nodes
        .values()
        .flat_map(|state| state.pods.iter())
        .chain(params.orphan_pods.iter())
        .filter(|pod| pod_template_hash(pod) == Some(hash));

    let mut current = 0;
    let mut ready = 0;
    let mut available = 0;
    for pod in pods {
        current += 1;
        if is_pod_ready(pod) {
            ready += 1;
        }
        if is_pod_available(pod, params.eds.spec.min_ready_seconds, now) {
            available += 1;
        }
    }

    let mut conditions = ers
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    update_condition(&mut conditions, ConditionType::Active, false, "", "", now, false);
    update_condition(&mut conditions, ConditionType::Canary, false, "", "", now, false);

    StrategyResult {
        status: ExtendedDaemonSetReplicaSetStatus {
            status: ReplicaSetRole::Unknown,
            desired: 0,
            current,
            ready,
            available,
            ignored_unresponsive_nodes: 0,
            conditions,
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::fixtures::{daemonset, node, pod, ready, replicaset, ts};
    use crate::controller::strategies::NodeState;
    use std::collections::BTreeMap;

    #[test]
    fn test_counts_own_pods_and_plans_nothing() {
        let start = ts("2024-01-01T00:00:00Z");
        let eds = daemonset("agent", "agent:v2");
        let ers = replicaset(&eds, "agent-old", "oldhash", start);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "node-1".to_string(),
            NodeState {
                node: node("node-1", &[]),
                override_hash: None,
                pods: vec![
                    ready(pod("old-1", "node-1", "oldhash", start), start),
                    pod("new-1", "node-1", "newhash", start),
                ],
            },
        );
        let orphans = vec![pod("old-2", "node-gone", "oldhash", start)];

        let result = manage_deployment(&StrategyParams {
            eds: &eds,
            replicaset: &ers,
            nodes: &nodes,
            orphan_pods: &orphans,
            now: start,
        });

        assert!(result.pods_to_create.is_empty());
        assert!(result.pods_to_delete.is_empty());
        assert_eq!(result.requeue_after, None);
        assert_eq!(result.status.status, ReplicaSetRole::Unknown);
        assert_eq!(result.status.desired, 0);
        assert_eq!(result.status.current, 2);
        assert_eq!(result.status.ready, 1);
        assert!(!crate::crd::condition::is_condition_true(
            &result.status.conditions,
            ConditionType::Active
        ));
    }
}
