//! Test fixtures for nodes, pods and daemon sets
#![allow(clippy::unwrap_used, clippy::expect_used)] // Test helpers - panicking is acceptable

use crate::controller::clock::from_utc;
use crate::crd::daemonset::{ExtendedDaemonSet, ExtendedDaemonSetSpec};
use crate::crd::keys::{ANNOTATION_TEMPLATE_HASH, LABEL_EDS_NAME, LABEL_ERS_NAME};
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetSpec};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStateRunning, ContainerStateTerminated,
    ContainerStateWaiting, ContainerStatus, Node, NodeCondition, NodeSpec, NodeStatus, Pod,
    PodCondition, PodSpec, PodStatus, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid RFC3339 timestamp")
        .with_timezone(&Utc)
}

pub fn k8s_time(at: DateTime<Utc>) -> Time {
    from_utc(at).expect("Time from chrono")
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A Ready node with the given labels
pub fn node(name: &str, node_labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(node_labels)),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn template(image: &str) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(&[("app", "agent")])),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "agent".to_string(),
                image: Some(image.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

pub fn daemonset(name: &str, image: &str) -> ExtendedDaemonSet {
    let mut eds = ExtendedDaemonSet::new(
        name,
        ExtendedDaemonSetSpec {
            selector: None,
            template: template(image),
            min_ready_seconds: 0,
            strategy: Default::default(),
        },
    );
    eds.metadata.namespace = Some("default".to_string());
    eds.metadata.uid = Some(format!("{}-uid", name));
    eds.metadata.resource_version = Some("1".to_string());
    eds
}

pub fn replicaset(
    eds: &ExtendedDaemonSet,
    name: &str,
    hash: &str,
    created: DateTime<Utc>,
) -> ExtendedDaemonSetReplicaSet {
    let eds_name = eds.metadata.name.clone().unwrap_or_default();
    let mut ers = ExtendedDaemonSetReplicaSet::new(
        name,
        ExtendedDaemonSetReplicaSetSpec {
            selector: None,
            template: eds.spec.template.clone(),
            template_generation: hash.to_string(),
        },
    );
    ers.metadata.namespace = Some("default".to_string());
    ers.metadata.uid = Some(format!("{}-uid", name));
    ers.metadata.creation_timestamp = Some(k8s_time(created));
    ers.metadata.labels = Some(labels(&[(LABEL_EDS_NAME, &eds_name)]));
    ers.metadata.annotations = Some(labels(&[(ANNOTATION_TEMPLATE_HASH, hash)]));
    ers
}

/// A running pod bound to `node_name`, not ready yet
pub fn pod(name: &str, node_name: &str, hash: &str, started: DateTime<Utc>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(labels(&[(LABEL_EDS_NAME, "agent"), (LABEL_ERS_NAME, "agent-rs")])),
            annotations: Some(labels(&[(ANNOTATION_TEMPLATE_HASH, hash)])),
            creation_timestamp: Some(k8s_time(started)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_string()),
            containers: vec![Container {
                name: "agent".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            start_time: Some(k8s_time(started)),
            container_statuses: Some(vec![ContainerStatus {
                name: "agent".to_string(),
                ready: false,
                restart_count: 0,
                image: "agent".to_string(),
                image_id: String::new(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Mark a pod Ready since `since`
pub fn ready(mut pod: Pod, since: DateTime<Utc>) -> Pod {
    let status = pod.status.get_or_insert_with(Default::default);
    status.conditions = Some(vec![PodCondition {
        type_: "Ready".to_string(),
        status: "True".to_string(),
        last_transition_time: Some(k8s_time(since)),
        ..Default::default()
    }]);
    if let Some(containers) = status.container_statuses.as_mut() {
        for cs in containers {
            cs.ready = true;
        }
    }
    pod
}

/// Give the pod's container a restart history
pub fn restarted(mut pod: Pod, restarts: i32, reason: &str) -> Pod {
    if let Some(containers) = pod
        .status
        .as_mut()
        .and_then(|s| s.container_statuses.as_mut())
    {
        for cs in containers {
            cs.restart_count = restarts;
            cs.last_state = Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    reason: Some(reason.to_string()),
                    exit_code: 1,
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
    }
    pod
}

/// Restart history whose last termination finished at `at`; the container runs again
pub fn restarted_at(pod: Pod, restarts: i32, reason: &str, at: DateTime<Utc>) -> Pod {
    let mut pod = restarted(pod, restarts, reason);
    if let Some(containers) = pod
        .status
        .as_mut()
        .and_then(|s| s.container_statuses.as_mut())
    {
        for cs in containers {
            if let Some(terminated) = cs.last_state.as_mut().and_then(|s| s.terminated.as_mut()) {
                terminated.finished_at = Some(k8s_time(at));
            }
            cs.state = Some(ContainerState {
                running: Some(ContainerStateRunning {
                    started_at: Some(k8s_time(at)),
                }),
                ..Default::default()
            });
        }
    }
    pod
}

/// Put the pod's container in a waiting state
pub fn waiting(mut pod: Pod, reason: &str) -> Pod {
    if let Some(containers) = pod
        .status
        .as_mut()
        .and_then(|s| s.container_statuses.as_mut())
    {
        for cs in containers {
            cs.ready = false;
            cs.state = Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..Default::default()
            });
        }
    }
    pod
}
