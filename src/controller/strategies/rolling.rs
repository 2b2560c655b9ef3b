//! Rolling update of the active replica set
//!
//! Serves every eligible node except the canary nodes. Nodes without a pod get one,
//! outdated pods are replaced within the availability budget computed by `limits`.

use super::{
    canary_node_names, classify_pods, is_node_ready, StrategyError, StrategyParams,
    StrategyResult, REQUEUE_CONVERGING,
};
use crate::controller::conditions::update_condition;
use crate::controller::limits::{
    calculate_pods_to_create_and_delete, elapsed_slow_start_intervals, max_creation,
    max_scheduler_failure, max_unavailable, LimitParams,
};
use crate::controller::podutil::{
    is_pod_available, is_pod_ready, is_pod_unschedulable, pod_node_name,
};
use crate::crd::condition::{find_condition, ConditionType};
use crate::crd::keys::{
    annotation, is_annotation_true, ANNOTATION_OLD_UNREADY_PODS,
    ANNOTATION_ROLLING_UPDATE_PAUSED, ANNOTATION_ROLLOUT_FROZEN, LABEL_CANARY,
};
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSetStatus, ReplicaSetRole};
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::debug;

/// Seconds after the rolling update starts during which leftover canary labels are removed
const CANARY_LABEL_CLEANUP_SECS: i64 = 300;

pub fn manage_deployment(params: &StrategyParams<'_>) -> Result<StrategyResult, StrategyError> {
    let eds = params.eds;
    let ers = params.replicaset;
    let now = params.now;
    let rolling = &eds.spec.strategy.rolling_update;

    let mut conditions = ers
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    update_condition(
        &mut conditions,
        ConditionType::Active,
        true,
        "Active",
        "replica set serves the daemon set",
        now,
        false,
    );
    update_condition(&mut conditions, ConditionType::Canary, false, "", "", now, false);
    let rolling_update_start = find_condition(&conditions, ConditionType::Active)
        .and_then(|c| c.transition_time());

    let canary_nodes: BTreeSet<String> = canary_node_names(eds).into_iter().collect();

    let mut nb_nodes = 0;
    let mut current = 0;
    let mut ready = 0;
    let mut available = 0;
    let mut old_available_pods = Vec::new();
    let mut nodes_missing_pod = Vec::new();
    let mut unresponsive = 0;
    let mut always_deletable = Vec::new();
    let mut unlabel = Vec::new();

    for (node_name, state) in params.nodes {
        if canary_nodes.contains(node_name) {
            continue;
        }
        nb_nodes += 1;
        let pods = classify_pods(state, ers);
        let node_ready = is_node_ready(&state.node);

        if pods.terminating {
            continue;
        }

        if let Some((pod, duplicates)) = pods.current.split_first() {
            current += 1;
            if is_pod_ready(pod) {
                ready += 1;
            }
            if is_pod_available(pod, eds.spec.min_ready_seconds, now) {
                available += 1;
            }
            if !node_ready || is_pod_unschedulable(pod) {
                unresponsive += 1;
            }
            if pod.labels().contains_key(LABEL_CANARY) {
                unlabel.push(pod.name_any());
            }
            always_deletable.extend(duplicates.iter().map(|p| p.name_any()));
            always_deletable.extend(pods.outdated.iter().map(|p| p.name_any()));
            continue;
        }

        match pods.outdated.split_first() {
            None => {
                if !node_ready {
                    unresponsive += 1;
                }
                nodes_missing_pod.push(node_name.clone());
            }
            Some((old, extra)) => {
                if !node_ready || is_pod_unschedulable(old) {
                    unresponsive += 1;
                }
                if is_pod_available(old, eds.spec.min_ready_seconds, now) {
                    old_available_pods.push(old.name_any());
                } else {
                    always_deletable.push(old.name_any());
                }
                always_deletable.extend(extra.iter().map(|p| p.name_any()));
            }
        }
    }

    for pod in params.orphan_pods {
        let on_canary_node = pod_node_name(pod)
            .map(|n| canary_nodes.contains(&n))
            .unwrap_or(false);
        if !on_canary_node {
            always_deletable.push(pod.name_any());
        }
    }

    // Carried unready pods only hold back the first slow-start step
    let old_unready_carried =
        if elapsed_slow_start_intervals(rolling, rolling_update_start, now) == 0 {
            annotation(&ers.metadata, ANNOTATION_OLD_UNREADY_PODS)
                .and_then(|v| v.parse::<i32>().ok())
                .unwrap_or(0)
        } else {
            0
        };

    let limit_params = LimitParams {
        nb_nodes,
        nb_available: available,
        nb_old_available: old_available_pods.len() as i32,
        nb_nodes_missing_pod: nodes_missing_pod.len() as i32,
        nb_unresponsive: unresponsive,
        nb_old_unready_carried: old_unready_carried,
        max_unavailable: max_unavailable(rolling, nb_nodes)?,
        max_creation: max_creation(rolling, nb_nodes, rolling_update_start, now)?,
        max_scheduler_failure: max_scheduler_failure(rolling, nb_nodes)?,
    };
    let limits = calculate_pods_to_create_and_delete(&limit_params);

    debug!(
        replicaset = ?ers.name_any(),
        nodes = nb_nodes,
        available = available,
        to_create = limits.to_create,
        to_delete = limits.to_delete_available,
        "Rolling update limits"
    );

    let frozen = is_annotation_true(&eds.metadata, ANNOTATION_ROLLOUT_FROZEN);
    let paused = is_annotation_true(&eds.metadata, ANNOTATION_ROLLING_UPDATE_PAUSED);

    let pods_to_create = if frozen {
        Vec::new()
    } else {
        nodes_missing_pod
            .into_iter()
            .take(limits.to_create as usize)
            .collect()
    };

    let pods_to_delete = if frozen || paused {
        Vec::new()
    } else {
        always_deletable
            .into_iter()
            .chain(
                old_available_pods
                    .into_iter()
                    .take(limits.to_delete_available as usize),
            )
            .collect()
    };

    let cleanup_canary_labels = rolling_update_start
        .map(|start| (now - start).num_seconds() <= CANARY_LABEL_CLEANUP_SECS)
        .unwrap_or(false);
    let pods_to_unlabel = if cleanup_canary_labels {
        unlabel
    } else {
        Vec::new()
    };

    let desired = nb_nodes - limits.ignored_unresponsive;
    let status = ExtendedDaemonSetReplicaSetStatus {
        status: ReplicaSetRole::Active,
        desired,
        current,
        ready,
        available,
        ignored_unresponsive_nodes: limits.ignored_unresponsive,
        conditions,
    };

    Ok(StrategyResult {
        pods_to_create,
        pods_to_delete,
        pods_to_unlabel,
        requeue_after: (desired != ready).then_some(REQUEUE_CONVERGING),
        status,
        ..Default::default()
    })
}

#[cfg(test)]
#[path = "rolling_test.rs"]
mod tests;
