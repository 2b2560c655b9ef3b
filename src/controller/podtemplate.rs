//! Pod construction from a replica set template
//!
//! Hashes identify template and node-override content, so a pod is current exactly
//! when both of its hash annotations match what would be built today.

use crate::controller::error::ReconcileError;
use crate::controller::scheduler::{add_daemon_tolerations, label_selector_matches};
use crate::crd::keys::{
    ANNOTATION_NODE_OVERRIDE_HASH, ANNOTATION_TEMPLATE_HASH, LABEL_CANARY, LABEL_EDS_NAME,
    LABEL_ERS_NAME, VALUE_TRUE,
};
use crate::crd::replicaset::ExtendedDaemonSetReplicaSet;
use crate::crd::setting::ExtendedDaemonSetSetting;
use k8s_openapi::api::core::v1::{
    Affinity, Node, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, Pod,
    PodTemplateSpec,
};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use std::collections::BTreeMap;

/// FNV-1a over the JSON form of `value`, as 10 hex chars
///
/// Deterministic across processes, unlike DefaultHasher/SipHash.
fn content_hash<T: Serialize>(value: &T) -> Result<String, ReconcileError> {
    let json = serde_json::to_string(value)
        .map_err(|e| ReconcileError::SerializationError(e.to_string()))?;

    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in json.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }

    Ok(format!("{hash:016x}")[..10].to_string())
}

/// Compute a stable 10-character hash for a PodTemplateSpec
///
/// # Errors
/// Returns SerializationError if the template cannot be serialized to JSON
pub fn compute_template_hash(template: &PodTemplateSpec) -> Result<String, ReconcileError> {
    content_hash(template)
}

/// Hash of a node override, covering only the fields applied to pods
pub fn compute_setting_hash(setting: &ExtendedDaemonSetSetting) -> Result<String, ReconcileError> {
    content_hash(&setting.spec.containers)
}

/// First setting (by name) referencing `eds_name` whose node selector matches `node`
pub fn find_setting_for_node<'a>(
    settings: &'a [ExtendedDaemonSetSetting],
    eds_name: &str,
    node: &Node,
) -> Option<&'a ExtendedDaemonSetSetting> {
    let empty = BTreeMap::new();
    let node_labels = node.metadata.labels.as_ref().unwrap_or(&empty);

    let mut matching: Vec<&ExtendedDaemonSetSetting> = settings
        .iter()
        .filter(|s| s.spec.reference == eds_name)
        .filter(|s| label_selector_matches(&s.spec.node_selector, node_labels))
        .collect();
    matching.sort_by_key(|s| s.name_any());
    matching.into_iter().next()
}

/// Pod built from a template without any node binding
///
/// Used to evaluate node fitness before a node is chosen.
pub fn synthetic_pod(template: &PodTemplateSpec) -> Pod {
    let mut pod = Pod {
        metadata: template.metadata.clone().unwrap_or_default(),
        spec: template.spec.clone(),
        status: None,
    };
    add_daemon_tolerations(&mut pod);
    pod
}

/// Pin a pod to `node_name` through a required `metadata.name` node affinity
///
/// Any previous required node affinity is replaced: node eligibility was decided
/// before the pod was built.
fn pin_to_node(pod: &mut Pod, node_name: &str) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    let affinity = spec.affinity.get_or_insert_with(Affinity::default);
    let node_affinity = affinity.node_affinity.get_or_insert_with(NodeAffinity::default);
    node_affinity.required_during_scheduling_ignored_during_execution = Some(NodeSelector {
        node_selector_terms: vec![NodeSelectorTerm {
            match_expressions: None,
            match_fields: Some(vec![NodeSelectorRequirement {
                key: "metadata.name".to_string(),
                operator: "In".to_string(),
                values: Some(vec![node_name.to_string()]),
            }]),
        }],
    });
}

fn apply_setting(pod: &mut Pod, setting: &ExtendedDaemonSetSetting) {
    let Some(spec) = pod.spec.as_mut() else {
        return;
    };
    for container in spec.containers.iter_mut() {
        if let Some(resources) = setting
            .spec
            .containers
            .iter()
            .find(|o| o.name == container.name)
            .and_then(|o| o.resources.clone())
        {
            container.resources = Some(resources);
        }
    }
}

/// Build the pod a replica set runs on `node_name`
///
/// The pod carries the template and override hashes, the owning names as labels,
/// an owner reference to the replica set, and the daemon tolerations. Canary pods
/// also get the transient canary label.
///
/// # Errors
/// Returns MissingName when the replica set has no name, or SerializationError if the
/// setting cannot be hashed
pub fn build_pod(
    ers: &ExtendedDaemonSetReplicaSet,
    node_name: &str,
    setting: Option<&ExtendedDaemonSetSetting>,
    canary: bool,
) -> Result<Pod, ReconcileError> {
    let ers_name = ers
        .meta()
        .name
        .clone()
        .ok_or(ReconcileError::ReplicaSetMissingName)?;
    let eds_name = ers
        .labels()
        .get(LABEL_EDS_NAME)
        .cloned()
        .unwrap_or_default();

    let template_meta = ers.spec.template.metadata.clone().unwrap_or_default();

    let mut labels = template_meta.labels.unwrap_or_default();
    labels.insert(LABEL_EDS_NAME.to_string(), eds_name);
    labels.insert(LABEL_ERS_NAME.to_string(), ers_name.clone());
    if canary {
        labels.insert(LABEL_CANARY.to_string(), VALUE_TRUE.to_string());
    }

    let mut annotations = template_meta.annotations.unwrap_or_default();
    annotations.insert(
        ANNOTATION_TEMPLATE_HASH.to_string(),
        ers.spec.template_generation.clone(),
    );
    if let Some(setting) = setting {
        annotations.insert(
            ANNOTATION_NODE_OVERRIDE_HASH.to_string(),
            compute_setting_hash(setting)?,
        );
    }

    let mut pod = Pod {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", ers_name)),
            namespace: ers.namespace(),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: ers.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: ers.spec.template.spec.clone(),
        status: None,
    };

    pin_to_node(&mut pod, node_name);
    add_daemon_tolerations(&mut pod);
    if let Some(setting) = setting {
        apply_setting(&mut pod, setting);
    }

    Ok(pod)
}
