use super::generation::Selection;
use crate::controller::conditions::update_condition;
use crate::controller::validation::parse_duration;
use crate::crd::condition::ConditionType;
use crate::crd::daemonset::{
    CanaryStatus, DaemonSetState, ExtendedDaemonSet, ExtendedDaemonSetStatus,
    DEFAULT_RECONCILE_FREQUENCY,
};
use crate::crd::keys::{
    is_annotation_true, ANNOTATION_ROLLING_UPDATE_PAUSED, ANNOTATION_ROLLOUT_FROZEN,
};
use crate::crd::replicaset::ExtendedDaemonSetReplicaSet;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Pod counts summed over every replica set of a daemon set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetTotals {
    pub desired: i32,
    pub current: i32,
    pub ready: i32,
    pub available: i32,
    pub ignored_unresponsive_nodes: i32,
}

impl FleetTotals {
    /// Pods that exist but are not ready yet
    pub fn unready(&self) -> i32 {
        (self.current - self.ready).max(0)
    }
}

pub fn fleet_totals(replicasets: &[ExtendedDaemonSetReplicaSet]) -> FleetTotals {
    replicasets
        .iter()
        .filter_map(|ers| ers.status.as_ref())
        .fold(FleetTotals::default(), |acc, s| FleetTotals {
            desired: acc.desired + s.desired,
            current: acc.current + s.current,
            ready: acc.ready + s.ready,
            available: acc.available + s.available,
            ignored_unresponsive_nodes: acc.ignored_unresponsive_nodes
                + s.ignored_unresponsive_nodes,
        })
}

/// Rollout state and its reason, highest priority first:
/// frozen, canary failed, canary paused, canary, rolling update paused, running
pub fn daemonset_state(
    eds: &ExtendedDaemonSet,
    selection: &Selection,
) -> (DaemonSetState, Option<String>) {
    if is_annotation_true(&eds.metadata, ANNOTATION_ROLLOUT_FROZEN) {
        return (DaemonSetState::RolloutFrozen, None);
    }
    if selection.failed {
        return (DaemonSetState::CanaryFailed, selection.failed_reason.clone());
    }
    if selection.paused {
        return (DaemonSetState::CanaryPaused, selection.paused_reason.clone());
    }
    if selection.canary {
        return (DaemonSetState::Canary, None);
    }
    if is_annotation_true(&eds.metadata, ANNOTATION_ROLLING_UPDATE_PAUSED) {
        return (DaemonSetState::RollingUpdatePaused, None);
    }
    (DaemonSetState::Running, None)
}

/// Status of `eds` after this pass
///
/// `canary_nodes` is the node list for the canary phase; it is ignored outside of it.
pub fn compute_status(
    eds: &ExtendedDaemonSet,
    replicasets: &[ExtendedDaemonSetReplicaSet],
    up_to_date: &ExtendedDaemonSetReplicaSet,
    selection: &Selection,
    canary_nodes: Vec<String>,
    now: DateTime<Utc>,
) -> ExtendedDaemonSetStatus {
    let previous = eds.status.clone().unwrap_or_default();
    let totals = fleet_totals(replicasets);
    let (state, reason) = daemonset_state(eds, selection);

    let canary = selection.canary.then(|| CanaryStatus {
        replica_set: up_to_date.metadata.name.clone().unwrap_or_default(),
        nodes: canary_nodes,
    });

    let mut conditions = previous.conditions;
    update_condition(
        &mut conditions,
        ConditionType::Canary,
        selection.canary,
        "Canary",
        "canary phase in progress",
        now,
        false,
    );
    update_condition(
        &mut conditions,
        ConditionType::CanaryPaused,
        selection.paused,
        selection.paused_reason.as_deref().unwrap_or_default(),
        "canary is paused",
        now,
        false,
    );
    update_condition(
        &mut conditions,
        ConditionType::CanaryFailed,
        selection.failed,
        selection.failed_reason.as_deref().unwrap_or_default(),
        "canary failed, template rolled back",
        now,
        false,
    );

    ExtendedDaemonSetStatus {
        desired: totals.desired,
        current: totals.current,
        ready: totals.ready,
        available: totals.available,
        up_to_date: up_to_date.status.as_ref().map(|s| s.current).unwrap_or(0),
        ignored_unresponsive_nodes: totals.ignored_unresponsive_nodes,
        state: Some(state),
        active_replica_set: Some(selection.current.clone()),
        canary,
        reason,
        conditions,
    }
}

/// Idle requeue interval from `strategy.reconcileFrequency`
pub fn reconcile_frequency(eds: &ExtendedDaemonSet) -> Duration {
    eds.spec
        .strategy
        .reconcile_frequency
        .as_deref()
        .and_then(parse_duration)
        .or_else(|| parse_duration(DEFAULT_RECONCILE_FREQUENCY))
        .unwrap_or(Duration::from_secs(10))
}

/// Next requeue: the remaining canary time when shorter than the idle frequency
pub fn requeue_interval(eds: &ExtendedDaemonSet, selection: &Selection) -> Duration {
    let frequency = reconcile_frequency(eds);
    selection
        .requeue_after
        .map(|remaining| remaining.min(frequency))
        .unwrap_or(frequency)
}
