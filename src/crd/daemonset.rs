use super::condition::Condition;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default for `rollingUpdate.maxUnavailable`
pub const DEFAULT_MAX_UNAVAILABLE: i32 = 1;
/// Default for `rollingUpdate.maxPodSchedulerFailure`
pub const DEFAULT_MAX_POD_SCHEDULER_FAILURE: &str = "10%";
/// Default for `rollingUpdate.maxParallelPodCreation`
pub const DEFAULT_MAX_PARALLEL_POD_CREATION: i32 = 250;
/// Default for `rollingUpdate.slowStartIntervalDuration`
pub const DEFAULT_SLOW_START_INTERVAL: &str = "1m";
/// Default for `rollingUpdate.slowStartAdditiveIncrease`
pub const DEFAULT_SLOW_START_ADDITIVE_INCREASE: i32 = 5;
/// Default for `canary.replicas`
pub const DEFAULT_CANARY_REPLICAS: i32 = 1;
/// Default for `canary.autoPause.maxRestarts`
pub const DEFAULT_AUTO_PAUSE_MAX_RESTARTS: i32 = 2;
/// Default for `canary.autoFail.maxRestarts`
pub const DEFAULT_AUTO_FAIL_MAX_RESTARTS: i32 = 5;
/// Default for `strategy.reconcileFrequency`
pub const DEFAULT_RECONCILE_FREQUENCY: &str = "10s";

/// ExtendedDaemonSet runs one pod per eligible node and rolls template changes out
/// node-by-node, optionally through a canary phase.
///
/// Every distinct pod template is captured in an immutable ExtendedDaemonSetReplicaSet;
/// `status.activeReplicaSet` names the one currently serving the fleet.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "eds.kulta.io",
    version = "v1alpha1",
    kind = "ExtendedDaemonSet",
    shortname = "eds",
    namespaced,
    status = "ExtendedDaemonSetStatus",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".status.desired"}"#,
    printcolumn = r#"{"name":"Current", "type":"integer", "jsonPath":".status.current"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Up-To-Date", "type":"integer", "jsonPath":".status.upToDate"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.available"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Active RS", "type":"string", "jsonPath":".status.activeReplicaSet"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ExtendedDaemonSetSpec {
    /// Label selector for pods (defaults to the template labels)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Template describes the pods that will be created on every node
    pub template: PodTemplateSpec,

    /// Seconds a pod must stay ready before it counts as available
    #[serde(rename = "minReadySeconds", default)]
    pub min_ready_seconds: i32,

    /// Rollout strategy
    #[serde(default)]
    pub strategy: ExtendedDaemonSetStrategy,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ExtendedDaemonSetStrategy {
    /// Pacing of the node-by-node rolling update
    #[serde(rename = "rollingUpdate", default)]
    pub rolling_update: RollingUpdateConfig,

    /// Optional canary phase run before the rolling update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryConfig>,

    /// Requeue interval when nothing is in progress (e.g., "10s")
    #[serde(
        rename = "reconcileFrequency",
        skip_serializing_if = "Option::is_none"
    )]
    pub reconcile_frequency: Option<String>,
}

/// Rolling update pacing
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RollingUpdateConfig {
    /// Maximum number of nodes without an available pod during the update.
    /// Absolute number (e.g., 1) or percentage of the fleet (e.g., "10%"). Defaults to 1.
    #[serde(rename = "maxUnavailable", skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Nodes tolerated as permanently unable to run their pod. Defaults to "10%".
    #[serde(
        rename = "maxPodSchedulerFailure",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_pod_scheduler_failure: Option<IntOrString>,

    /// Upper bound of pods created in a single pass. Defaults to 250.
    #[serde(
        rename = "maxParallelPodCreation",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_parallel_pod_creation: Option<i32>,

    /// Length of one slow-start interval (e.g., "1m"). Defaults to "1m".
    #[serde(
        rename = "slowStartIntervalDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub slow_start_interval_duration: Option<String>,

    /// Pods added to the creation budget every interval. Defaults to 5.
    #[serde(
        rename = "slowStartAdditiveIncrease",
        skip_serializing_if = "Option::is_none"
    )]
    pub slow_start_additive_increase: Option<IntOrString>,
}

impl RollingUpdateConfig {
    pub fn max_unavailable(&self) -> IntOrString {
        self.max_unavailable
            .clone()
            .unwrap_or(IntOrString::Int(DEFAULT_MAX_UNAVAILABLE))
    }

    pub fn max_pod_scheduler_failure(&self) -> IntOrString {
        self.max_pod_scheduler_failure
            .clone()
            .unwrap_or_else(|| IntOrString::String(DEFAULT_MAX_POD_SCHEDULER_FAILURE.to_string()))
    }

    pub fn max_parallel_pod_creation(&self) -> i32 {
        self.max_parallel_pod_creation
            .unwrap_or(DEFAULT_MAX_PARALLEL_POD_CREATION)
    }

    pub fn slow_start_interval_duration(&self) -> &str {
        self.slow_start_interval_duration
            .as_deref()
            .unwrap_or(DEFAULT_SLOW_START_INTERVAL)
    }

    pub fn slow_start_additive_increase(&self) -> IntOrString {
        self.slow_start_additive_increase
            .clone()
            .unwrap_or(IntOrString::Int(DEFAULT_SLOW_START_ADDITIVE_INCREASE))
    }
}

/// How a canary is promoted
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum CanaryValidationMode {
    /// Promote once `duration` (and `noRestartsDuration`) have elapsed
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Promote only through the canary-valid annotation
    #[serde(rename = "manual")]
    Manual,
}

/// Canary phase configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CanaryConfig {
    /// Number (or percentage of the fleet) of canary nodes. Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<IntOrString>,

    /// How long the canary runs before promotion (e.g., "10m").
    /// Without a duration the canary only ends through the canary-valid annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Minimum time without pod restarts before the canary may end
    #[serde(
        rename = "noRestartsDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub no_restarts_duration: Option<String>,

    /// Restricts which nodes may host canary pods
    #[serde(rename = "nodeSelector", skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,

    /// Node label keys across whose values canary nodes are spread evenly
    #[serde(rename = "nodeAntiAffinityKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub node_anti_affinity_keys: Vec<String>,

    /// auto (duration based) or manual (annotation based) promotion
    #[serde(rename = "validationMode", skip_serializing_if = "Option::is_none")]
    pub validation_mode: Option<CanaryValidationMode>,

    #[serde(rename = "autoPause", skip_serializing_if = "Option::is_none")]
    pub auto_pause: Option<CanaryAutoPause>,

    #[serde(rename = "autoFail", skip_serializing_if = "Option::is_none")]
    pub auto_fail: Option<CanaryAutoFail>,
}

impl CanaryConfig {
    pub fn replicas(&self) -> IntOrString {
        self.replicas
            .clone()
            .unwrap_or(IntOrString::Int(DEFAULT_CANARY_REPLICAS))
    }

    pub fn validation_mode(&self) -> CanaryValidationMode {
        self.validation_mode.clone().unwrap_or_default()
    }

    /// Auto-pause settings, if enabled
    pub fn auto_pause_enabled(&self) -> Option<&CanaryAutoPause> {
        self.auto_pause
            .as_ref()
            .filter(|p| p.enabled.unwrap_or(true))
    }

    /// Auto-fail settings, if enabled
    pub fn auto_fail_enabled(&self) -> Option<&CanaryAutoFail> {
        self.auto_fail.as_ref().filter(|f| f.enabled.unwrap_or(true))
    }
}

/// Automatically pause the canary when pods misbehave
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CanaryAutoPause {
    /// Defaults to true when the block is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Pause when a canary pod restarted more than this. Defaults to 2.
    #[serde(rename = "maxRestarts", skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<i32>,

    /// Grace period for a pod to start before it is considered stuck
    #[serde(
        rename = "maxSlowStartDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_slow_start_duration: Option<String>,
}

impl CanaryAutoPause {
    pub fn max_restarts(&self) -> i32 {
        self.max_restarts.unwrap_or(DEFAULT_AUTO_PAUSE_MAX_RESTARTS)
    }
}

/// Automatically fail the canary (and roll back) when pods misbehave
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CanaryAutoFail {
    /// Defaults to true when the block is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Fail when a canary pod restarted more than this. Defaults to 5.
    #[serde(rename = "maxRestarts", skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<i32>,

    /// Fail when canary restarts, from the first to the latest, span longer than this
    #[serde(
        rename = "maxRestartsDuration",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_restarts_duration: Option<String>,

    /// Fail when the canary has not been promoted after this long
    #[serde(rename = "canaryTimeout", skip_serializing_if = "Option::is_none")]
    pub canary_timeout: Option<String>,
}

impl CanaryAutoFail {
    pub fn max_restarts(&self) -> i32 {
        self.max_restarts.unwrap_or(DEFAULT_AUTO_FAIL_MAX_RESTARTS)
    }
}

/// Rollout state reported on the ExtendedDaemonSet
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum DaemonSetState {
    /// Steady state or rolling update in progress
    #[default]
    Running,
    /// Canary phase in progress
    Canary,
    /// Canary paused, waiting for manual action
    CanaryPaused,
    /// Canary failed, template rolled back
    CanaryFailed,
    /// Rolling update deletions suppressed by annotation
    RollingUpdatePaused,
    /// Creations and deletions suppressed by annotation
    RolloutFrozen,
}

/// Canary bookkeeping on the ExtendedDaemonSet
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CanaryStatus {
    /// Name of the ExtendedDaemonSetReplicaSet under canary
    #[serde(rename = "replicaSet")]
    pub replica_set: String,

    /// Nodes selected to run the canary pods
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Status of the ExtendedDaemonSet
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ExtendedDaemonSetStatus {
    /// Nodes that should run a pod
    #[serde(default)]
    pub desired: i32,

    /// Pods created across all replica sets
    #[serde(default)]
    pub current: i32,

    /// Ready pods across all replica sets
    #[serde(default)]
    pub ready: i32,

    /// Available pods across all replica sets
    #[serde(default)]
    pub available: i32,

    /// Pods running the current template
    #[serde(rename = "upToDate", default)]
    pub up_to_date: i32,

    /// Nodes ignored because their pod could never be scheduled
    #[serde(rename = "ignoredUnresponsiveNodes", default)]
    pub ignored_unresponsive_nodes: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DaemonSetState>,

    /// Name of the ExtendedDaemonSetReplicaSet serving the fleet
    #[serde(rename = "activeReplicaSet", skip_serializing_if = "Option::is_none")]
    pub active_replica_set: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryStatus>,

    /// Human-readable reason for the current state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
#[path = "daemonset_test.rs"]
mod tests;
