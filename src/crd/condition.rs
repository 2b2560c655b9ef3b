use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of fact recorded by a Condition
///
/// ExtendedDaemonSet uses Canary, CanaryPaused, CanaryFailed, CanaryNodeSelection and
/// ReconcileError. ExtendedDaemonSetReplicaSet uses every type except CanaryNodeSelection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConditionType {
    /// The replica set is the one serving the fleet
    Active,
    /// A canary phase is running
    Canary,
    /// The canary is paused (manually or by auto-pause)
    CanaryPaused,
    /// The canary failed and the rollout is abandoned
    CanaryFailed,
    /// Canary node selection could not find enough nodes
    CanaryNodeSelection,
    /// A canary pod cannot start (image pull, config errors)
    PodCannotStart,
    /// A canary pod has restarted; lastUpdateTime follows the latest restart
    PodRestarting,
    /// The last pass failed to create some pods
    PodsCreation,
    /// The last pass failed to delete some pods
    PodsDeletion,
    /// The last reconcile pass returned an error
    ReconcileError,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A named boolean fact with timestamps
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    /// When the status last flipped (RFC3339)
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// When reason/message last changed (RFC3339)
    #[serde(rename = "lastUpdateTime", skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn transition_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.last_transition_time.as_deref())
    }

    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.last_update_time.as_deref())
    }
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Find a condition by type
pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True if the condition exists and its status is True
pub fn is_condition_true(conditions: &[Condition], type_: ConditionType) -> bool {
    find_condition(conditions, type_)
        .map(Condition::is_true)
        .unwrap_or(false)
}
