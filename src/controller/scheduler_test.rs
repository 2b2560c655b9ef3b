use super::*;
use crate::controller::fixtures::{labels, node};
use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, PodSpec, Taint,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

fn daemon_pod() -> Pod {
    let mut pod = Pod {
        spec: Some(PodSpec::default()),
        ..Default::default()
    };
    add_daemon_tolerations(&mut pod);
    pod
}

fn tainted(mut n: Node, key: &str, value: Option<&str>, effect: &str) -> Node {
    let spec = n.spec.get_or_insert_with(Default::default);
    spec.taints.get_or_insert_with(Vec::new).push(Taint {
        key: key.to_string(),
        value: value.map(str::to_string),
        effect: effect.to_string(),
        time_added: None,
    });
    n
}

fn with_required_terms(mut pod: Pod, terms: Vec<NodeSelectorTerm>) -> Pod {
    if let Some(spec) = pod.spec.as_mut() {
        spec.affinity = Some(Affinity {
            node_affinity: Some(NodeAffinity {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: terms,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    pod
}

fn requirement(key: &str, operator: &str, values: &[&str]) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: Some(values.iter().map(|v| v.to_string()).collect()),
    }
}

#[test]
fn test_untainted_node_fits() {
    assert!(node_fits(&daemon_pod(), &node("node-1", &[])));
}

#[test]
fn test_daemon_tolerations_cover_node_conditions() {
    let n = tainted(node("node-1", &[]), TAINT_NOT_READY, None, "NoExecute");
    let n = tainted(n, TAINT_UNSCHEDULABLE, None, "NoSchedule");
    assert!(node_fits(&daemon_pod(), &n));
}

#[test]
fn test_daemon_tolerations_are_idempotent() {
    let mut pod = daemon_pod();
    let before = pod.spec.as_ref().and_then(|s| s.tolerations.clone());
    add_daemon_tolerations(&mut pod);
    assert_eq!(pod.spec.as_ref().and_then(|s| s.tolerations.clone()), before);
}

#[test]
fn test_untolerated_taint_rejects_node() {
    let n = tainted(node("node-1", &[]), "dedicated", Some("gpu"), "NoSchedule");
    assert!(!node_fits(&daemon_pod(), &n));
}

#[test]
fn test_prefer_no_schedule_taint_is_ignored() {
    let n = tainted(node("node-1", &[]), "dedicated", Some("gpu"), "PreferNoSchedule");
    assert!(node_fits(&daemon_pod(), &n));
}

#[test]
fn test_equal_toleration_requires_matching_value() {
    let mut pod = daemon_pod();
    if let Some(tolerations) = pod.spec.as_mut().and_then(|s| s.tolerations.as_mut()) {
        tolerations.push(Toleration {
            key: Some("dedicated".to_string()),
            operator: Some("Equal".to_string()),
            value: Some("gpu".to_string()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        });
    }

    let gpu = tainted(node("node-1", &[]), "dedicated", Some("gpu"), "NoSchedule");
    let infra = tainted(node("node-2", &[]), "dedicated", Some("infra"), "NoSchedule");
    assert!(node_fits(&pod, &gpu));
    assert!(!node_fits(&pod, &infra));
}

#[test]
fn test_wildcard_toleration_tolerates_everything() {
    let mut pod = daemon_pod();
    if let Some(tolerations) = pod.spec.as_mut().and_then(|s| s.tolerations.as_mut()) {
        tolerations.push(Toleration {
            operator: Some("Exists".to_string()),
            ..Default::default()
        });
    }
    let n = tainted(node("node-1", &[]), "anything", Some("x"), "NoExecute");
    assert!(node_fits(&pod, &n));
}

#[test]
fn test_node_selector_must_match_labels() {
    let mut pod = daemon_pod();
    if let Some(spec) = pod.spec.as_mut() {
        spec.node_selector = Some(labels(&[("kubernetes.io/os", "linux")]));
    }
    assert!(node_fits(&pod, &node("linux-1", &[("kubernetes.io/os", "linux")])));
    assert!(!node_fits(&pod, &node("win-1", &[("kubernetes.io/os", "windows")])));
}

#[test]
fn test_required_affinity_terms_are_ored() {
    let pod = with_required_terms(
        daemon_pod(),
        vec![
            NodeSelectorTerm {
                match_expressions: Some(vec![requirement("zone", "In", &["a"])]),
                match_fields: None,
            },
            NodeSelectorTerm {
                match_expressions: Some(vec![requirement("zone", "In", &["b"])]),
                match_fields: None,
            },
        ],
    );
    assert!(node_fits(&pod, &node("n-a", &[("zone", "a")])));
    assert!(node_fits(&pod, &node("n-b", &[("zone", "b")])));
    assert!(!node_fits(&pod, &node("n-c", &[("zone", "c")])));
}

#[test]
fn test_match_fields_pin_pod_to_node_name() {
    let pod = with_required_terms(
        daemon_pod(),
        vec![NodeSelectorTerm {
            match_expressions: None,
            match_fields: Some(vec![requirement("metadata.name", "In", &["node-1"])]),
        }],
    );
    assert!(node_fits(&pod, &node("node-1", &[])));
    assert!(!node_fits(&pod, &node("node-2", &[])));
}

#[test]
fn test_numeric_and_existence_operators() {
    let pod = with_required_terms(
        daemon_pod(),
        vec![NodeSelectorTerm {
            match_expressions: Some(vec![
                requirement("cpu-count", "Gt", &["4"]),
                requirement("spot", "DoesNotExist", &[]),
            ]),
            match_fields: None,
        }],
    );
    assert!(node_fits(&pod, &node("big", &[("cpu-count", "8")])));
    assert!(!node_fits(&pod, &node("small", &[("cpu-count", "2")])));
    assert!(!node_fits(&pod, &node("spot", &[("cpu-count", "8"), ("spot", "true")])));
}

#[test]
fn test_empty_term_matches_nothing() {
    let pod = with_required_terms(daemon_pod(), vec![NodeSelectorTerm::default()]);
    assert!(!node_fits(&pod, &node("node-1", &[])));
}

#[test]
fn test_label_selector_matches() {
    let selector = LabelSelector {
        match_labels: Some(labels(&[("pool", "canary")])),
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "zone".to_string(),
            operator: "NotIn".to_string(),
            values: Some(vec!["c".to_string()]),
        }]),
    };

    assert!(label_selector_matches(
        &selector,
        &labels(&[("pool", "canary"), ("zone", "a")])
    ));
    assert!(!label_selector_matches(
        &selector,
        &labels(&[("pool", "canary"), ("zone", "c")])
    ));
    assert!(!label_selector_matches(&selector, &labels(&[("zone", "a")])));
    assert!(label_selector_matches(&LabelSelector::default(), &labels(&[])));
}
