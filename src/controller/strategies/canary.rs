//! Canary replica set handler
//!
//! Runs the new template on the canary nodes only. Every pass recomputes pause and
//! failure from the observed pods, the daemon set annotations and the conditions
//! already recorded on the replica set:
//! - failure is sticky through the CanaryFailed condition
//! - pause persists through the CanaryPaused condition until the unpause annotation
//! - creations stop while paused or failed, deletions only once failed

use super::{
    canary_node_names, classify_pods, StrategyParams, StrategyResult, REQUEUE_CONVERGING,
};
use crate::controller::conditions::update_condition;
use crate::controller::podutil::{
    cannot_start_reason, highest_restart_count, is_pod_available, is_pod_ready,
    last_restart_time, pod_start_time, total_restart_count,
};
use crate::controller::validation::parse_chrono_duration;
use crate::crd::condition::{find_condition, ConditionType};
use crate::crd::daemonset::{CanaryConfig, CanaryValidationMode};
use crate::crd::keys::{
    annotation, is_annotation_true, ANNOTATION_CANARY_PAUSED, ANNOTATION_CANARY_PAUSED_REASON,
    ANNOTATION_CANARY_UNPAUSED,
};
use crate::crd::replicaset::{
    ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetStatus, ReplicaSetRole,
};
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{info, warn};

pub const REASON_RESTARTS_TIMEOUT_EXCEEDED: &str = "RestartsTimeoutExceeded";
pub const REASON_TIMEOUT_EXCEEDED: &str = "TimeoutExceeded";
pub const REASON_SLOW_START_TIMEOUT_EXCEEDED: &str = "SlowStartTimeoutExceeded";
pub const REASON_PAUSED_BY_ANNOTATION: &str = "PausedByAnnotation";

/// Health facts gathered over the canary pods of one pass
#[derive(Debug, Default)]
struct CanaryHealth {
    /// Highest restart count of a single container
    restarts: i32,
    restart_reason: String,
    /// Restarts summed over the canary pods
    total_restarts: i32,
    last_restart: Option<DateTime<Utc>>,
    cannot_start: Option<String>,
    /// A cannot-start or unready pod outlived `maxSlowStartDuration`
    slow_start_exceeded: Option<String>,
}

impl CanaryHealth {
    fn observe(
        &mut self,
        pod: &k8s_openapi::api::core::v1::Pod,
        max_slow_start: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) {
        let (restarts, reason) = highest_restart_count(pod);
        if restarts > self.restarts {
            self.restarts = restarts;
            self.restart_reason = reason;
        }
        self.total_restarts += total_restart_count(pod);
        self.last_restart = self.last_restart.max(last_restart_time(pod));

        let waiting = cannot_start_reason(pod);
        if self.cannot_start.is_none() {
            self.cannot_start = waiting.clone();
        }

        let exceeded = match (max_slow_start, pod_start_time(pod)) {
            (Some(max), Some(started)) => now - started > max,
            _ => false,
        };
        if exceeded && !is_pod_ready(pod) && self.slow_start_exceeded.is_none() {
            self.slow_start_exceeded =
                Some(waiting.unwrap_or_else(|| REASON_SLOW_START_TIMEOUT_EXCEEDED.to_string()));
        }
    }
}

pub fn manage_deployment(params: &StrategyParams<'_>) -> StrategyResult {
    let eds = params.eds;
    let ers = params.replicaset;
    let now = params.now;
    let canary = eds.spec.strategy.canary.clone().unwrap_or_default();

    let previous = ers
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let mut conditions = previous.clone();

    let auto_pause = canary.auto_pause_enabled();
    let max_slow_start = auto_pause
        .and_then(|p| parse_chrono_duration(p.max_slow_start_duration.as_deref()));

    let mut desired = 0;
    let mut current = 0;
    let mut ready = 0;
    let mut available = 0;
    let mut pods_to_create = Vec::new();
    let mut pods_to_delete = Vec::new();
    let mut converging = false;
    let mut health = CanaryHealth::default();

    for node_name in canary_node_names(eds) {
        let Some(state) = params.nodes.get(&node_name) else {
            continue;
        };
        desired += 1;
        let pods = classify_pods(state, ers);
        if pods.terminating {
            converging = true;
            continue;
        }

        pods_to_delete.extend(pods.outdated.iter().map(|p| p.name_any()));
        match pods.current.split_first() {
            None => pods_to_create.push(node_name.clone()),
            Some((pod, duplicates)) => {
                pods_to_delete.extend(duplicates.iter().map(|p| p.name_any()));
                current += 1;
                if is_pod_ready(pod) {
                    ready += 1;
                }
                if is_pod_available(pod, eds.spec.min_ready_seconds, now) {
                    available += 1;
                }
                health.observe(pod, max_slow_start, now);
            }
        }
    }

    update_condition(&mut conditions, ConditionType::Active, false, "", "", now, false);
    update_condition(
        &mut conditions,
        ConditionType::Canary,
        true,
        "Canary",
        "replica set runs on the canary nodes",
        now,
        false,
    );
    update_condition(
        &mut conditions,
        ConditionType::PodCannotStart,
        health.cannot_start.is_some(),
        health.cannot_start.as_deref().unwrap_or_default(),
        "a canary pod cannot start",
        now,
        false,
    );
    // The count in the message moves lastUpdateTime on every new restart
    update_condition(
        &mut conditions,
        ConditionType::PodRestarting,
        health.total_restarts > 0,
        &health.restart_reason,
        &format!("canary pods restarted {} time(s)", health.total_restarts),
        health.last_restart.unwrap_or(now),
        false,
    );

    let failed_reason = evaluate_failure(&canary, &previous, &conditions, &health, now);
    let paused_reason = if failed_reason.is_some() {
        None
    } else {
        evaluate_pause(params, &canary, &previous, &health)
    };

    update_condition(
        &mut conditions,
        ConditionType::CanaryPaused,
        paused_reason.is_some(),
        paused_reason.as_deref().unwrap_or_default(),
        "canary is paused",
        now,
        false,
    );
    update_condition(
        &mut conditions,
        ConditionType::CanaryFailed,
        failed_reason.is_some(),
        failed_reason.as_deref().unwrap_or_default(),
        "canary failed",
        now,
        false,
    );

    let is_failed = failed_reason.is_some();
    let is_paused = paused_reason.is_some();
    if is_failed {
        warn!(replicaset = ?ers.name_any(), reason = ?failed_reason, "Canary failed");
        pods_to_create.clear();
        pods_to_delete.clear();
    } else if is_paused {
        info!(replicaset = ?ers.name_any(), reason = ?paused_reason, "Canary paused");
        pods_to_create.clear();
    }

    let status = ExtendedDaemonSetReplicaSetStatus {
        status: ReplicaSetRole::Canary,
        desired,
        current,
        ready,
        available,
        ignored_unresponsive_nodes: 0,
        conditions,
    };

    StrategyResult {
        pods_to_create,
        pods_to_delete,
        pods_to_unlabel: Vec::new(),
        requeue_after: (converging || desired != ready).then_some(REQUEUE_CONVERGING),
        status,
        is_paused,
        paused_reason,
        is_failed,
        failed_reason,
    }
}

/// First auto-fail trigger, or the reason already recorded
fn evaluate_failure(
    canary: &CanaryConfig,
    previous: &[crate::crd::condition::Condition],
    conditions: &[crate::crd::condition::Condition],
    health: &CanaryHealth,
    now: DateTime<Utc>,
) -> Option<String> {
    if let Some(failed) = find_condition(previous, ConditionType::CanaryFailed).filter(|c| c.is_true())
    {
        return Some(failed.reason.clone().unwrap_or_default());
    }

    let auto_fail = canary.auto_fail_enabled()?;

    if health.restarts > auto_fail.max_restarts() {
        return Some(health.restart_reason.clone());
    }

    // Restarts spread from the first to the latest over more than the limit
    if let Some(max) = parse_chrono_duration(auto_fail.max_restarts_duration.as_deref()) {
        let restarting_span = find_condition(conditions, ConditionType::PodRestarting)
            .filter(|c| c.is_true())
            .and_then(|c| Some(c.update_time()? - c.transition_time()?));
        if restarting_span.map(|span| span > max).unwrap_or(false) {
            return Some(REASON_RESTARTS_TIMEOUT_EXCEEDED.to_string());
        }
    }

    if let Some(timeout) = parse_chrono_duration(auto_fail.canary_timeout.as_deref()) {
        let started = find_condition(conditions, ConditionType::Canary)
            .filter(|c| c.is_true())
            .and_then(|c| c.transition_time());
        if started.map(|t| now - t > timeout).unwrap_or(false) {
            return Some(REASON_TIMEOUT_EXCEEDED.to_string());
        }
    }

    None
}

/// Pause reason for this pass, or None when the canary may proceed
fn evaluate_pause(
    params: &StrategyParams<'_>,
    canary: &CanaryConfig,
    previous: &[crate::crd::condition::Condition],
    health: &CanaryHealth,
) -> Option<String> {
    let eds = params.eds;
    if is_annotation_true(&eds.metadata, ANNOTATION_CANARY_UNPAUSED) {
        return None;
    }

    if let Some(auto_pause) = canary.auto_pause_enabled() {
        let has_slow_start = auto_pause.max_slow_start_duration.is_some();
        if let Some(reason) = health.slow_start_exceeded.clone() {
            return Some(reason);
        }
        if !has_slow_start {
            if let Some(reason) = health.cannot_start.clone() {
                return Some(reason);
            }
        }
        if health.restarts > auto_pause.max_restarts() {
            return Some(health.restart_reason.clone());
        }
    }

    if is_annotation_true(&eds.metadata, ANNOTATION_CANARY_PAUSED) {
        return Some(
            annotation(&eds.metadata, ANNOTATION_CANARY_PAUSED_REASON)
                .filter(|r| !r.is_empty())
                .unwrap_or(REASON_PAUSED_BY_ANNOTATION)
                .to_string(),
        );
    }

    find_condition(previous, ConditionType::CanaryPaused)
        .filter(|c| c.is_true())
        .map(|c| c.reason.clone().unwrap_or_default())
}

/// Has the canary window of `ers` ended
///
/// Returns whether it ended and the remaining time (negative once elapsed). The
/// window ends at `creationTimestamp + duration`, pushed back to
/// `noRestartsDuration` after the last recorded restart. Without a duration, or in
/// manual validation mode, the canary never ends on its own.
pub fn is_canary_deployment_ended(
    canary: &CanaryConfig,
    ers: &ExtendedDaemonSetReplicaSet,
    now: DateTime<Utc>,
) -> (bool, chrono::Duration) {
    if canary.validation_mode() == CanaryValidationMode::Manual {
        return (false, chrono::Duration::zero());
    }
    let Some(duration) = parse_chrono_duration(canary.duration.as_deref()) else {
        return (false, chrono::Duration::zero());
    };

    let created = ers
        .metadata
        .creation_timestamp
        .as_ref()
        .and_then(crate::controller::clock::to_utc)
        .unwrap_or(now);
    let mut end = created + duration;

    if let Some(no_restarts) = parse_chrono_duration(canary.no_restarts_duration.as_deref()) {
        let conditions = ers
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        let last_restart = find_condition(conditions, ConditionType::PodRestarting)
            .and_then(|c| c.update_time().or_else(|| c.transition_time()));
        if let Some(last_restart) = last_restart {
            end = end.max(last_restart + no_restarts);
        }
    }

    let remaining = end - now;
    (remaining <= chrono::Duration::zero(), remaining)
}

#[cfg(test)]
#[path = "canary_test.rs"]
mod tests;
