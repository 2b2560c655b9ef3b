//! Node fitness predicate
//!
//! Simulates the scheduler checks a daemon pod must pass on a node: taints and
//! tolerations, `nodeSelector`, and required node affinity. Resource fit is left to
//! the real scheduler; a pod that can never be placed is tracked as an
//! unresponsive node by the rolling update instead.

use k8s_openapi::api::core::v1::{
    Node, NodeSelectorRequirement, NodeSelectorTerm, Pod, Taint, Toleration,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;

const TAINT_NOT_READY: &str = "node.kubernetes.io/not-ready";
const TAINT_UNREACHABLE: &str = "node.kubernetes.io/unreachable";
const TAINT_DISK_PRESSURE: &str = "node.kubernetes.io/disk-pressure";
const TAINT_MEMORY_PRESSURE: &str = "node.kubernetes.io/memory-pressure";
const TAINT_PID_PRESSURE: &str = "node.kubernetes.io/pid-pressure";
const TAINT_UNSCHEDULABLE: &str = "node.kubernetes.io/unschedulable";
const TAINT_NETWORK_UNAVAILABLE: &str = "node.kubernetes.io/network-unavailable";

/// Returns true if `pod` could be scheduled on `node`
pub fn node_fits(pod: &Pod, node: &Node) -> bool {
    let empty = BTreeMap::new();
    let node_labels = node.metadata.labels.as_ref().unwrap_or(&empty);
    let node_name = node.metadata.name.as_deref().unwrap_or_default();

    tolerates_node_taints(pod, node)
        && matches_node_selector(pod, node_labels)
        && matches_required_affinity(pod, node_name, node_labels)
}

/// Add the tolerations every daemon pod carries
///
/// Daemon pods must keep running through node conditions that evict regular pods.
pub fn add_daemon_tolerations(pod: &mut Pod) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    let host_network = spec.host_network.unwrap_or(false);
    let tolerations = spec.tolerations.get_or_insert_with(Vec::new);

    let mut wanted = vec![
        (TAINT_NOT_READY, "NoExecute"),
        (TAINT_UNREACHABLE, "NoExecute"),
        (TAINT_DISK_PRESSURE, "NoSchedule"),
        (TAINT_MEMORY_PRESSURE, "NoSchedule"),
        (TAINT_PID_PRESSURE, "NoSchedule"),
        (TAINT_UNSCHEDULABLE, "NoSchedule"),
    ];
    if host_network {
        wanted.push((TAINT_NETWORK_UNAVAILABLE, "NoSchedule"));
    }

    for (key, effect) in wanted {
        let present = tolerations.iter().any(|t| {
            t.key.as_deref() == Some(key)
                && t.effect.as_deref() == Some(effect)
                && t.operator.as_deref() == Some("Exists")
        });
        if !present {
            tolerations.push(Toleration {
                key: Some(key.to_string()),
                operator: Some("Exists".to_string()),
                effect: Some(effect.to_string()),
                ..Default::default()
            });
        }
    }
}

fn tolerates_node_taints(pod: &Pod, node: &Node) -> bool {
    let tolerations: &[Toleration] = pod
        .spec
        .as_ref()
        .and_then(|s| s.tolerations.as_deref())
        .unwrap_or_default();
    let taints: &[Taint] = node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_deref())
        .unwrap_or_default();

    taints
        .iter()
        .filter(|taint| taint.effect == "NoSchedule" || taint.effect == "NoExecute")
        .all(|taint| tolerations.iter().any(|t| tolerates(t, taint)))
}

fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    if let Some(effect) = toleration.effect.as_deref().filter(|e| !e.is_empty()) {
        if effect != taint.effect {
            return false;
        }
    }

    let operator = toleration.operator.as_deref().unwrap_or("Equal");
    match toleration.key.as_deref().filter(|k| !k.is_empty()) {
        // Empty key with Exists tolerates every taint
        None => operator == "Exists",
        Some(key) if key != taint.key => false,
        Some(_) => match operator {
            "Exists" => true,
            "Equal" | "" => toleration.value.as_deref().unwrap_or_default()
                == taint.value.as_deref().unwrap_or_default(),
            _ => false,
        },
    }
}

fn matches_node_selector(pod: &Pod, node_labels: &BTreeMap<String, String>) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_selector.as_ref())
        .map(|selector| {
            selector
                .iter()
                .all(|(k, v)| node_labels.get(k) == Some(v))
        })
        .unwrap_or(true)
}

fn matches_required_affinity(
    pod: &Pod,
    node_name: &str,
    node_labels: &BTreeMap<String, String>,
) -> bool {
    let required = pod
        .spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref());

    match required {
        None => true,
        Some(selector) => selector
            .node_selector_terms
            .iter()
            .any(|term| term_matches(term, node_name, node_labels)),
    }
}

fn term_matches(
    term: &NodeSelectorTerm,
    node_name: &str,
    node_labels: &BTreeMap<String, String>,
) -> bool {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let fields = term.match_fields.as_deref().unwrap_or_default();

    // An empty term matches no objects
    if expressions.is_empty() && fields.is_empty() {
        return false;
    }

    let node_fields = BTreeMap::from([("metadata.name".to_string(), node_name.to_string())]);

    expressions
        .iter()
        .all(|req| requirement_matches(req, node_labels))
        && fields
            .iter()
            .all(|req| requirement_matches(req, &node_fields))
}

fn requirement_matches(req: &NodeSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.as_deref().unwrap_or_default();
    let actual = labels.get(&req.key);

    match req.operator.as_str() {
        "In" => actual.map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => actual.map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => actual.is_some(),
        "DoesNotExist" => actual.is_none(),
        "Gt" | "Lt" => {
            let (Some(actual), Some(bound)) = (
                actual.and_then(|v| v.parse::<i64>().ok()),
                values.first().and_then(|v| v.parse::<i64>().ok()),
            ) else {
                return false;
            };
            if req.operator == "Gt" {
                actual > bound
            } else {
                actual < bound
            }
        }
        _ => false,
    }
}

/// Evaluate a metav1 LabelSelector against a label set
///
/// An empty selector matches everything.
pub fn label_selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .as_ref()
        .map(|wanted| wanted.iter().all(|(k, v)| labels.get(k) == Some(v)))
        .unwrap_or(true);

    let expressions_match = selector
        .match_expressions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .all(|expr| {
            let values = expr.values.as_deref().unwrap_or_default();
            let actual = labels.get(&expr.key);
            match expr.operator.as_str() {
                "In" => actual.map(|v| values.contains(v)).unwrap_or(false),
                "NotIn" => actual.map(|v| !values.contains(v)).unwrap_or(true),
                "Exists" => actual.is_some(),
                "DoesNotExist" => actual.is_none(),
                _ => false,
            }
        });

    labels_match && expressions_match
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
