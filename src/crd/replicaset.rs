use super::condition::Condition;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ExtendedDaemonSetReplicaSet is an immutable snapshot of an ExtendedDaemonSet pod
/// template. It is owned by exactly one ExtendedDaemonSet and manages the pods
/// created from that template.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "eds.kulta.io",
    version = "v1alpha1",
    kind = "ExtendedDaemonSetReplicaSet",
    shortname = "ers",
    namespaced,
    status = "ExtendedDaemonSetReplicaSetStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".status.desired"}"#,
    printcolumn = r#"{"name":"Current", "type":"integer", "jsonPath":".status.current"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.available"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ExtendedDaemonSetReplicaSetSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    pub template: PodTemplateSpec,

    /// Content hash of `template`
    #[serde(rename = "templateGeneration")]
    pub template_generation: String,
}

/// Role of a replica set, decided by the owning ExtendedDaemonSet
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ReplicaSetRole {
    /// Serves every non-canary node through the rolling update
    #[serde(rename = "active")]
    Active,
    /// Runs on the canary nodes only
    #[serde(rename = "canary")]
    Canary,
    /// Outdated; waits for its pods to be replaced, then gets deleted
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ReplicaSetRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaSetRole::Active => "active",
            ReplicaSetRole::Canary => "canary",
            ReplicaSetRole::Unknown => "unknown",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ExtendedDaemonSetReplicaSetStatus {
    #[serde(default)]
    pub status: ReplicaSetRole,

    #[serde(default)]
    pub desired: i32,

    #[serde(default)]
    pub current: i32,

    #[serde(default)]
    pub ready: i32,

    #[serde(default)]
    pub available: i32,

    #[serde(rename = "ignoredUnresponsiveNodes", default)]
    pub ignored_unresponsive_nodes: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ExtendedDaemonSetReplicaSetStatus {
    /// True when no pod of this replica set is desired or still alive
    pub fn has_no_pods(&self) -> bool {
        self.desired == 0 && self.current == 0 && self.ready == 0 && self.available == 0
    }
}
