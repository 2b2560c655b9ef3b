//! Pod status helpers
//!
//! Readiness, availability, restart and start-failure inspection used by both
//! the canary and the rolling-update strategies.

use crate::controller::clock::to_utc;
use crate::crd::keys::{ANNOTATION_NODE_OVERRIDE_HASH, ANNOTATION_TEMPLATE_HASH};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodCondition};

/// Waiting reasons meaning a container will not start without intervention
pub const CANNOT_START_REASONS: &[&str] = &[
    "ErrImagePull",
    "ImagePullBackOff",
    "ErrImageNeverPull",
    "InvalidImageName",
    "RegistryUnavailable",
    "CreateContainerConfigError",
    "CreateContainerError",
    "PreCreateHookError",
    "PostStartHookError",
];

fn pod_condition<'a>(pod: &'a Pod, type_: &str) -> Option<&'a PodCondition> {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == type_))
}

fn container_statuses(pod: &Pod) -> impl Iterator<Item = &ContainerStatus> {
    let status = pod.status.as_ref();
    let init = status
        .and_then(|s| s.init_container_statuses.as_ref())
        .into_iter()
        .flatten();
    let main = status
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten();
    init.chain(main)
}

/// Pod has a `Ready=True` condition
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod_condition(pod, "Ready")
        .map(|c| c.status == "True")
        .unwrap_or(false)
}

/// Pod has been ready for at least `min_ready_seconds`
pub fn is_pod_available(pod: &Pod, min_ready_seconds: i32, now: DateTime<Utc>) -> bool {
    let Some(ready) = pod_condition(pod, "Ready").filter(|c| c.status == "True") else {
        return false;
    };
    if min_ready_seconds <= 0 {
        return true;
    }
    ready
        .last_transition_time
        .as_ref()
        .and_then(to_utc)
        .map(|since| since + chrono::Duration::seconds(i64::from(min_ready_seconds)) <= now)
        .unwrap_or(false)
}

/// Pod is being deleted
pub fn is_pod_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Scheduler reported the pod as unschedulable
pub fn is_pod_unschedulable(pod: &Pod) -> bool {
    pod_condition(pod, "PodScheduled")
        .map(|c| c.status == "False" && c.reason.as_deref() == Some("Unschedulable"))
        .unwrap_or(false)
}

/// Highest container restart count of a pod, with that container's last termination reason
pub fn highest_restart_count(pod: &Pod) -> (i32, String) {
    container_statuses(pod)
        .filter(|cs| cs.restart_count > 0)
        .max_by_key(|cs| cs.restart_count)
        .map(|cs| {
            let reason = cs
                .last_state
                .as_ref()
                .and_then(|s| s.terminated.as_ref())
                .and_then(|t| t.reason.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            (cs.restart_count, reason)
        })
        .unwrap_or((0, String::new()))
}

/// Restarts summed over every container of the pod
pub fn total_restart_count(pod: &Pod) -> i32 {
    container_statuses(pod).map(|cs| cs.restart_count.max(0)).sum()
}

/// Most recent container restart of the pod
///
/// Taken from the last termination's `finishedAt`, or from when the restarted
/// container started running again, whichever is later.
pub fn last_restart_time(pod: &Pod) -> Option<DateTime<Utc>> {
    container_statuses(pod)
        .filter(|cs| cs.restart_count > 0)
        .flat_map(|cs| {
            let finished = cs
                .last_state
                .as_ref()
                .and_then(|s| s.terminated.as_ref())
                .and_then(|t| t.finished_at.as_ref());
            let restarted = cs
                .state
                .as_ref()
                .and_then(|s| s.running.as_ref())
                .and_then(|r| r.started_at.as_ref());
            [finished, restarted]
        })
        .flatten()
        .filter_map(to_utc)
        .max()
}

/// Waiting reason of the first container stuck on a cannot-start error
pub fn cannot_start_reason(pod: &Pod) -> Option<String> {
    container_statuses(pod)
        .filter_map(|cs| cs.state.as_ref().and_then(|s| s.waiting.as_ref()))
        .filter_map(|w| w.reason.as_deref())
        .find(|reason| CANNOT_START_REASONS.contains(reason))
        .map(str::to_string)
}

/// When the kubelet started the pod, falling back to its creation time
pub fn pod_start_time(pod: &Pod) -> Option<DateTime<Utc>> {
    pod.status
        .as_ref()
        .and_then(|s| s.start_time.as_ref())
        .or(pod.metadata.creation_timestamp.as_ref())
        .and_then(to_utc)
}

/// Template hash annotation of a pod
pub fn pod_template_hash(pod: &Pod) -> Option<&str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_TEMPLATE_HASH))
        .map(String::as_str)
}

/// Node override hash annotation of a pod
pub fn pod_node_override_hash(pod: &Pod) -> Option<&str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_NODE_OVERRIDE_HASH))
        .map(String::as_str)
}

/// Node a pod runs on, or is pinned to through its `metadata.name` node affinity
pub fn pod_node_name(pod: &Pod) -> Option<String> {
    let spec = pod.spec.as_ref()?;
    if let Some(node) = spec.node_name.as_ref().filter(|n| !n.is_empty()) {
        return Some(node.clone());
    }
    spec.affinity
        .as_ref()?
        .node_affinity
        .as_ref()?
        .required_during_scheduling_ignored_during_execution
        .as_ref()?
        .node_selector_terms
        .iter()
        .filter_map(|term| term.match_fields.as_ref())
        .flatten()
        .find(|req| req.key == "metadata.name" && req.operator == "In")
        .and_then(|req| req.values.as_ref())
        .and_then(|values| values.first().cloned())
}

#[cfg(test)]
#[path = "podutil_test.rs"]
mod tests;
