use super::generation::{
    build_replicaset, find_active, find_up_to_date, replicasets_to_delete, select_current,
};
use super::status::{compute_status, fleet_totals, requeue_interval};
use crate::controller::canary_nodes::{eligible_nodes, select_canary_nodes, CanaryNodeRequest};
use crate::controller::conditions::update_condition;
use crate::controller::context::Context;
use crate::controller::error::ReconcileError;
use crate::controller::intstr::scaled_value;
use crate::controller::podtemplate::{compute_template_hash, synthetic_pod};
use crate::controller::store::StoreError;
use crate::controller::validation::validate_daemonset;
use crate::crd::condition::ConditionType;
use crate::crd::daemonset::{DaemonSetState, ExtendedDaemonSet};
use crate::crd::replicaset::ExtendedDaemonSetReplicaSet;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Requeue after creating a replica set, so the next pass sees it listed
pub const REQUEUE_AFTER_CREATE: Duration = Duration::from_secs(1);

/// Reconcile an ExtendedDaemonSet
///
/// One pass:
/// 1. Validates the spec and lists the daemon set's replica sets
/// 2. Creates the up-to-date replica set if the template changed, then requeues
/// 3. Decides the current replica set (canary, promotion, failure)
/// 4. Deletes stale replica sets
/// 5. Keeps the canary node list topped up
/// 6. Persists status, then rolls the template back if the canary failed
///
/// # Returns
/// * `Ok(Action)` - Requeue after the remaining canary time or `reconcileFrequency`
/// * `Err(ReconcileError)` - The pass failed and is retried by the error policy
pub async fn reconcile(
    eds: Arc<ExtendedDaemonSet>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = Instant::now();
    let result = reconcile_daemonset(&eds, &ctx).await;

    if let Some(ref metrics) = ctx.metrics {
        let duration_secs = start_time.elapsed().as_secs_f64();
        if result.is_ok() {
            metrics.record_reconciliation_success("daemonset", duration_secs);
        } else {
            metrics.record_reconciliation_error("daemonset", duration_secs);
        }
    }

    result
}

async fn reconcile_daemonset(
    eds: &ExtendedDaemonSet,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let namespace = eds.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = eds.name_any();
    let now = ctx.clock.now();

    if eds.metadata.deletion_timestamp.is_some() {
        debug!(eds = ?name, "ExtendedDaemonSet is being deleted, skipping");
        return Ok(Action::await_change());
    }

    info!(eds = ?name, namespace = ?namespace, "Reconciling ExtendedDaemonSet");

    if let Err(validation_error) = validate_daemonset(eds) {
        error!(
            eds = ?name,
            error = ?validation_error,
            "ExtendedDaemonSet spec validation failed"
        );
        return Err(ReconcileError::ValidationError(validation_error));
    }

    let replicasets: Vec<ExtendedDaemonSetReplicaSet> = ctx
        .store
        .list_replicasets(&namespace, &name)
        .await?
        .into_iter()
        .filter(|ers| ers.metadata.deletion_timestamp.is_none())
        .collect();

    let hash = compute_template_hash(&eds.spec.template)?;
    let Some(up_to_date) = find_up_to_date(&replicasets, &hash) else {
        let unready = fleet_totals(&replicasets).unready();
        let ers = build_replicaset(eds, &hash, unready)?;
        match ctx.store.create_replicaset(&namespace, &ers).await {
            Ok(created) => {
                info!(eds = ?name, replicaset = ?created.name_any(), "Created ExtendedDaemonSetReplicaSet")
            }
            Err(StoreError::Conflict(_)) => {
                debug!(eds = ?name, hash = %hash, "Replica set already exists")
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(Action::requeue(REQUEUE_AFTER_CREATE));
    };

    let active = find_active(eds, &replicasets);
    let selection = select_current(eds, active, up_to_date, now);
    debug!(
        eds = ?name,
        current = %selection.current,
        up_to_date = ?up_to_date.name_any(),
        canary = selection.canary,
        "Selected current replica set"
    );

    let up_to_date_name = up_to_date.name_any();
    let stale = replicasets_to_delete(&replicasets, &selection.current, &up_to_date_name, now);
    for ers in &stale {
        info!(eds = ?name, replicaset = ?ers.name_any(), "Deleting stale replica set");
        ctx.store
            .delete_replicaset(&namespace, &ers.name_any())
            .await?;
    }
    let remaining: Vec<ExtendedDaemonSetReplicaSet> = replicasets
        .iter()
        .filter(|ers| !stale.iter().any(|s| s.name_any() == ers.name_any()))
        .cloned()
        .collect();

    let mut selection_error = None;
    let canary_nodes = if selection.canary {
        match canary_node_names(eds, up_to_date, ctx).await {
            Ok(nodes) => nodes,
            Err(ReconcileError::NodeSelection(e)) => {
                warn!(eds = ?name, error = %e, "Canary node selection failed, keeping previous nodes");
                selection_error = Some(e);
                previous_canary_nodes(eds, &up_to_date_name)
            }
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };

    let mut status = compute_status(eds, &remaining, up_to_date, &selection, canary_nodes, now);
    let selection_message = selection_error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
    update_condition(
        &mut status.conditions,
        ConditionType::CanaryNodeSelection,
        selection_error.is_some(),
        "InsufficientNodes",
        &selection_message,
        now,
        false,
    );
    update_condition(
        &mut status.conditions,
        ConditionType::ReconcileError,
        selection_error.is_some(),
        "CanaryNodeSelection",
        &selection_message,
        now,
        false,
    );

    let mut latest = eds.clone();
    if eds.status.as_ref() != Some(&status) {
        info!(
            eds = ?name,
            state = ?status.state,
            active = ?status.active_replica_set,
            "Updating ExtendedDaemonSet status"
        );
        latest = ctx
            .store
            .replace_daemonset_status(&namespace, &name, &status)
            .await?;
    }

    if let Some(ref metrics) = ctx.metrics {
        let state = status.state.clone().unwrap_or(DaemonSetState::Running);
        metrics.set_daemonset_state(&namespace, &name, &state);
    }

    if selection.failed {
        rollback_template(&latest, &replicasets, &selection.current, ctx).await?;
    }

    if let Some(e) = selection_error {
        return Err(ReconcileError::NodeSelection(e));
    }

    Ok(Action::requeue(requeue_interval(eds, &selection)))
}

/// Canary nodes recorded for `replica_set` by a previous pass
fn previous_canary_nodes(eds: &ExtendedDaemonSet, replica_set: &str) -> Vec<String> {
    eds.status
        .as_ref()
        .and_then(|s| s.canary.as_ref())
        .filter(|c| c.replica_set == replica_set)
        .map(|c| c.nodes.clone())
        .unwrap_or_default()
}

/// Canary node list for this pass, topped up to the configured replica count
async fn canary_node_names(
    eds: &ExtendedDaemonSet,
    up_to_date: &ExtendedDaemonSetReplicaSet,
    ctx: &Context,
) -> Result<Vec<String>, ReconcileError> {
    let canary = eds.spec.strategy.canary.clone().unwrap_or_default();
    let nodes = ctx.store.list_nodes().await?;
    let pod = synthetic_pod(&up_to_date.spec.template);

    let fleet_size = eligible_nodes(&nodes, None, &pod).len() as i32;
    let replicas = scaled_value(&canary.replicas(), fleet_size, true)?;
    let previous = previous_canary_nodes(eds, &up_to_date.name_any());

    let selected = select_canary_nodes(&CanaryNodeRequest {
        nodes: &nodes,
        node_selector: canary.node_selector.as_ref(),
        pod: &pod,
        previous: &previous,
        replicas: replicas.max(0) as usize,
        anti_affinity_keys: &canary.node_anti_affinity_keys,
    })?;
    Ok(selected)
}

/// Restore the template of the current replica set after a failed canary
///
/// Uses the object returned by the status write so a concurrent spec edit surfaces
/// as a conflict instead of being overwritten.
async fn rollback_template(
    latest: &ExtendedDaemonSet,
    replicasets: &[ExtendedDaemonSetReplicaSet],
    current: &str,
    ctx: &Context,
) -> Result<(), ReconcileError> {
    let Some(current) = replicasets.iter().find(|ers| ers.name_any() == current) else {
        return Ok(());
    };
    if latest.spec.template == current.spec.template {
        return Ok(());
    }

    warn!(
        eds = ?latest.name_any(),
        replicaset = ?current.name_any(),
        "Canary failed, rolling template back"
    );
    let mut rolled_back = latest.clone();
    rolled_back.spec.template = current.spec.template.clone();
    ctx.store.replace_daemonset(&rolled_back).await?;
    Ok(())
}
