use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ExtendedDaemonSetSetting overrides container resources for the pods an
/// ExtendedDaemonSet runs on a subset of nodes.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "eds.kulta.io",
    version = "v1alpha1",
    kind = "ExtendedDaemonSetSetting",
    shortname = "edss",
    namespaced,
    printcolumn = r#"{"name":"Reference", "type":"string", "jsonPath":".spec.reference"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ExtendedDaemonSetSettingSpec {
    /// Name of the ExtendedDaemonSet this setting applies to
    pub reference: String,

    /// Nodes the override applies to
    #[serde(rename = "nodeSelector")]
    pub node_selector: LabelSelector,

    #[serde(default)]
    pub containers: Vec<ContainerOverride>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ContainerOverride {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}
