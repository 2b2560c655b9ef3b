//! Replica set generations of a daemon set
//!
//! Finds the up-to-date and active replica sets, decides which one is current, and
//! picks the stale ones to garbage-collect.

use crate::controller::clock::to_utc;
use crate::controller::error::ReconcileError;
use crate::controller::strategies::canary::{
    is_canary_deployment_ended, REASON_PAUSED_BY_ANNOTATION,
};
use crate::crd::condition::{find_condition, is_condition_true, ConditionType};
use crate::crd::daemonset::ExtendedDaemonSet;
use crate::crd::keys::{
    annotation, is_annotation_true, ANNOTATION_CANARY_PAUSED, ANNOTATION_CANARY_UNPAUSED,
    ANNOTATION_CANARY_VALID, ANNOTATION_OLD_UNREADY_PODS, ANNOTATION_TEMPLATE_HASH,
    LABEL_EDS_NAME,
};
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetSpec};
use chrono::{DateTime, Utc};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::time::Duration;

/// Seconds a failed canary replica set is kept before it is deleted
pub const FAILED_CANARY_GC_DELAY_SECS: i64 = 120;

/// Replica set whose template hash matches `hash`
///
/// Several matches can only come from a race between two passes; the oldest wins.
pub fn find_up_to_date<'a>(
    replicasets: &'a [ExtendedDaemonSetReplicaSet],
    hash: &str,
) -> Option<&'a ExtendedDaemonSetReplicaSet> {
    replicasets
        .iter()
        .filter(|ers| ers.spec.template_generation == hash)
        .min_by_key(|ers| {
            (
                ers.metadata.creation_timestamp.as_ref().and_then(to_utc),
                ers.name_any(),
            )
        })
}

/// Replica set named by `status.activeReplicaSet`, if it still exists
pub fn find_active<'a>(
    eds: &ExtendedDaemonSet,
    replicasets: &'a [ExtendedDaemonSetReplicaSet],
) -> Option<&'a ExtendedDaemonSetReplicaSet> {
    let name = eds.status.as_ref()?.active_replica_set.as_deref()?;
    replicasets.iter().find(|ers| ers.name_any() == name)
}

/// New replica set capturing the current template of `eds`
///
/// The name is derived from the hash, so two racing passes collide on create instead
/// of producing duplicates. `old_unready` seeds the slow-start accounting of the new
/// generation.
pub fn build_replicaset(
    eds: &ExtendedDaemonSet,
    hash: &str,
    old_unready: i32,
) -> Result<ExtendedDaemonSetReplicaSet, ReconcileError> {
    let eds_name = eds.name_any();
    let namespace = eds.namespace().ok_or(ReconcileError::MissingNamespace)?;

    let labels = BTreeMap::from([(LABEL_EDS_NAME.to_string(), eds_name.clone())]);
    let annotations = BTreeMap::from([
        (ANNOTATION_TEMPLATE_HASH.to_string(), hash.to_string()),
        (ANNOTATION_OLD_UNREADY_PODS.to_string(), old_unready.to_string()),
    ]);

    Ok(ExtendedDaemonSetReplicaSet {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}", eds_name, hash)),
            namespace: Some(namespace),
            labels: Some(labels),
            annotations: Some(annotations),
            owner_references: eds.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: ExtendedDaemonSetReplicaSetSpec {
            selector: eds.spec.selector.clone(),
            template: eds.spec.template.clone(),
            template_generation: hash.to_string(),
        },
        status: None,
    })
}

/// Outcome of choosing the current replica set
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Name of the replica set recorded as active
    pub current: String,
    /// The up-to-date replica set runs as a canary
    pub canary: bool,
    pub paused: bool,
    pub paused_reason: Option<String>,
    /// The up-to-date replica set failed its canary
    pub failed: bool,
    pub failed_reason: Option<String>,
    /// Time left before the canary may be promoted
    pub requeue_after: Option<Duration>,
}

impl Selection {
    fn promote(name: String) -> Self {
        Selection {
            current: name,
            canary: false,
            paused: false,
            paused_reason: None,
            failed: false,
            failed_reason: None,
            requeue_after: None,
        }
    }
}

fn condition_reason(ers: &ExtendedDaemonSetReplicaSet, type_: ConditionType) -> Option<String> {
    ers.status
        .as_ref()
        .and_then(|s| find_condition(&s.conditions, type_))
        .filter(|c| c.is_true())
        .map(|c| c.reason.clone().unwrap_or_default())
}

/// Decide which replica set is current
///
/// - no active replica set, or active is up-to-date: the up-to-date one
/// - no canary configured: the up-to-date one
/// - canary failed: stay on the active one
/// - canary ended or validated through annotation, and not paused: the up-to-date one
/// - otherwise the canary keeps running on the active one
pub fn select_current(
    eds: &ExtendedDaemonSet,
    active: Option<&ExtendedDaemonSetReplicaSet>,
    up_to_date: &ExtendedDaemonSetReplicaSet,
    now: DateTime<Utc>,
) -> Selection {
    let up_to_date_name = up_to_date.name_any();
    let Some(active) = active.filter(|a| a.name_any() != up_to_date_name) else {
        return Selection::promote(up_to_date_name);
    };
    let Some(canary) = eds.spec.strategy.canary.as_ref() else {
        return Selection::promote(up_to_date_name);
    };

    let conditions = up_to_date
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();

    if is_condition_true(conditions, ConditionType::CanaryFailed) {
        return Selection {
            current: active.name_any(),
            canary: false,
            paused: false,
            paused_reason: None,
            failed: true,
            failed_reason: condition_reason(up_to_date, ConditionType::CanaryFailed),
            requeue_after: None,
        };
    }

    let unpaused = is_annotation_true(&eds.metadata, ANNOTATION_CANARY_UNPAUSED);
    let paused_reason = if unpaused {
        None
    } else {
        condition_reason(up_to_date, ConditionType::CanaryPaused).or_else(|| {
            is_annotation_true(&eds.metadata, ANNOTATION_CANARY_PAUSED)
                .then(|| REASON_PAUSED_BY_ANNOTATION.to_string())
        })
    };
    let paused = paused_reason.is_some();

    let valid = annotation(&eds.metadata, ANNOTATION_CANARY_VALID) == Some(up_to_date_name.as_str());
    let (ended, remaining) = is_canary_deployment_ended(canary, up_to_date, now);

    if !paused && (valid || ended) {
        return Selection::promote(up_to_date_name);
    }

    Selection {
        current: active.name_any(),
        canary: true,
        paused,
        paused_reason,
        failed: false,
        failed_reason: None,
        requeue_after: remaining.to_std().ok().filter(|d| !d.is_zero()),
    }
}

/// Replica sets to delete: neither current nor up-to-date, and either empty or failed
/// for longer than the grace period
pub fn replicasets_to_delete<'a>(
    replicasets: &'a [ExtendedDaemonSetReplicaSet],
    current: &str,
    up_to_date: &str,
    now: DateTime<Utc>,
) -> Vec<&'a ExtendedDaemonSetReplicaSet> {
    replicasets
        .iter()
        .filter(|ers| {
            let name = ers.name_any();
            name != current && name != up_to_date
        })
        .filter(|ers| {
            let Some(status) = ers.status.as_ref() else {
                return true;
            };
            if status.has_no_pods() {
                return true;
            }
            find_condition(&status.conditions, ConditionType::CanaryFailed)
                .filter(|c| c.is_true())
                .and_then(|c| c.transition_time())
                .map(|failed_at| (now - failed_at).num_seconds() >= FAILED_CANARY_GC_DELAY_SECS)
                .unwrap_or(false)
        })
        .collect()
}
