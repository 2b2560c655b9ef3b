//! Rolling update rate limiter
//!
//! Pure arithmetic over pod counts: how many pods may be created this pass (slow-start
//! ramp) and how many outdated available pods may be torn down (availability budget).

use crate::controller::intstr::{scaled_value, IntOrPercentError};
use crate::controller::validation::parse_chrono_duration;
use crate::crd::daemonset::{RollingUpdateConfig, DEFAULT_SLOW_START_INTERVAL};
use chrono::{DateTime, Utc};

/// Counts observed on the nodes served by a replica set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitParams {
    /// Nodes that should run a pod
    pub nb_nodes: i32,
    /// Available pods running the current template
    pub nb_available: i32,
    /// Available pods still running an outdated template
    pub nb_old_available: i32,
    /// Nodes without any pod
    pub nb_nodes_missing_pod: i32,
    /// Nodes whose pod can never start (node not ready, pod unschedulable)
    pub nb_unresponsive: i32,
    /// Unready pods carried from the previous generation, charged against the
    /// creation budget of the current slow-start step
    pub nb_old_unready_carried: i32,
    pub max_unavailable: i32,
    pub max_creation: i32,
    pub max_scheduler_failure: i32,
}

/// Output of the limiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Pods that may be created this pass
    pub to_create: i32,
    /// Outdated available pods that may be deleted this pass.
    /// Outdated pods that are not available can always be deleted.
    pub to_delete_available: i32,
    /// Unresponsive nodes left out of the unavailable count
    pub ignored_unresponsive: i32,
}

/// Compute pod creation and deletion budgets
///
/// `unavailable = nodes - available - old_available - ignored_unresponsive`. Deleting an
/// outdated available pod makes one more node unavailable, so deletions stop at
/// `max_unavailable`. Carried unready pods only slow down creation.
pub fn calculate_pods_to_create_and_delete(params: &LimitParams) -> Limits {
    let ignored_unresponsive = params
        .nb_unresponsive
        .min(params.max_scheduler_failure)
        .max(0);

    let unavailable = (params.nb_nodes
        - params.nb_available
        - params.nb_old_available
        - ignored_unresponsive)
        .max(0);

    let to_delete_available = (params.max_unavailable - unavailable)
        .max(0)
        .min(params.nb_old_available.max(0));

    let to_create = (params.max_creation - params.nb_old_unready_carried.max(0))
        .min(params.nb_nodes_missing_pod)
        .max(0);

    Limits {
        to_create,
        to_delete_available,
        ignored_unresponsive,
    }
}

/// `maxUnavailable` resolved against the fleet size, rounded up
pub fn max_unavailable(
    rolling: &RollingUpdateConfig,
    nb_nodes: i32,
) -> Result<i32, IntOrPercentError> {
    scaled_value(&rolling.max_unavailable(), nb_nodes, true)
}

/// `maxPodSchedulerFailure` resolved against the fleet size, rounded up
pub fn max_scheduler_failure(
    rolling: &RollingUpdateConfig,
    nb_nodes: i32,
) -> Result<i32, IntOrPercentError> {
    scaled_value(&rolling.max_pod_scheduler_failure(), nb_nodes, true)
}

/// Whole slow-start intervals elapsed since `rolling_update_start`
///
/// Without a start time the ramp is at its first step.
pub fn elapsed_slow_start_intervals(
    rolling: &RollingUpdateConfig,
    rolling_update_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let interval = parse_chrono_duration(Some(rolling.slow_start_interval_duration()))
        .or_else(|| parse_chrono_duration(Some(DEFAULT_SLOW_START_INTERVAL)))
        .map(|d| d.num_seconds())
        .filter(|secs| *secs > 0)
        .unwrap_or(60);

    rolling_update_start
        .map(|start| (now - start).num_seconds().max(0) / interval)
        .unwrap_or(0)
}

/// Slow-start creation budget
///
/// `min(maxParallelPodCreation, (1 + elapsedIntervals) * slowStartAdditiveIncrease)`,
/// where intervals are counted from `rolling_update_start`.
pub fn max_creation(
    rolling: &RollingUpdateConfig,
    nb_nodes: i32,
    rolling_update_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<i32, IntOrPercentError> {
    let additive = i64::from(scaled_value(
        &rolling.slow_start_additive_increase(),
        nb_nodes,
        true,
    )?);
    let elapsed_intervals = elapsed_slow_start_intervals(rolling, rolling_update_start, now);

    let ramp = elapsed_intervals
        .saturating_add(1)
        .saturating_mul(additive);
    let cap = i64::from(rolling.max_parallel_pod_creation());

    Ok(ramp.min(cap).max(0) as i32)
}
