use super::podops::{create_pods, delete_pods, unlabel_pods};
use super::snapshot::build_snapshot;
use crate::controller::conditions::update_condition;
use crate::controller::context::Context;
use crate::controller::daemonset::reconcile_frequency;
use crate::controller::error::ReconcileError;
use crate::controller::store::StoreError;
use crate::controller::strategies::{manage_deployment, replicaset_role, StrategyParams};
use crate::crd::condition::ConditionType;
use crate::crd::keys::LABEL_EDS_NAME;
use crate::crd::replicaset::{ExtendedDaemonSetReplicaSet, ReplicaSetRole};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reconcile an ExtendedDaemonSetReplicaSet
///
/// Takes its role from the owning daemon set, runs the matching strategy over a
/// node and pod snapshot, applies the planned pod operations, then persists status.
///
/// # Returns
/// * `Ok(Action)` - Requeue while pods converge, otherwise after `reconcileFrequency`
/// * `Err(ReconcileError)` - Listing failed, the strategy rejected its config, or some
///   pod operations failed (status is written first)
pub async fn reconcile(
    ers: Arc<ExtendedDaemonSetReplicaSet>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = Instant::now();
    let result = reconcile_replicaset(&ers, &ctx).await;

    if let Some(ref metrics) = ctx.metrics {
        let duration_secs = start_time.elapsed().as_secs_f64();
        if result.is_ok() {
            metrics.record_reconciliation_success("replicaset", duration_secs);
        } else {
            metrics.record_reconciliation_error("replicaset", duration_secs);
        }
    }

    result
}

async fn reconcile_replicaset(
    ers: &ExtendedDaemonSetReplicaSet,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let namespace = ers.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = ers.name_any();
    let now = ctx.clock.now();

    if ers.metadata.deletion_timestamp.is_some() {
        debug!(replicaset = ?name, "Replica set is being deleted, skipping");
        return Ok(Action::await_change());
    }

    let Some(eds_name) = ers.labels().get(LABEL_EDS_NAME).cloned() else {
        warn!(replicaset = ?name, "Replica set has no daemon set label, ignoring");
        return Ok(Action::await_change());
    };
    let eds = match ctx.store.get_daemonset(&namespace, &eds_name).await {
        Ok(eds) => eds,
        Err(StoreError::NotFound(_)) => {
            debug!(replicaset = ?name, eds = ?eds_name, "Owning daemon set is gone");
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let nodes = ctx.store.list_nodes().await?;
    let pods = ctx.store.list_pods(&namespace, &eds_name).await?;
    let settings = ctx.store.list_settings(&namespace).await?;
    let snapshot = build_snapshot(ers, &eds_name, nodes, pods, &settings)?;

    let role = replicaset_role(&eds, ers);
    info!(
        replicaset = ?name,
        namespace = ?namespace,
        role = role.as_str(),
        nodes = snapshot.nodes.len(),
        "Reconciling ExtendedDaemonSetReplicaSet"
    );

    let result = manage_deployment(
        role,
        &StrategyParams {
            eds: &eds,
            replicaset: ers,
            nodes: &snapshot.nodes,
            orphan_pods: &snapshot.orphan_pods,
            now,
        },
    )?;

    let store = ctx.store.as_ref();
    let created = create_pods(
        store,
        &namespace,
        ers,
        &snapshot,
        &result.pods_to_create,
        role == ReplicaSetRole::Canary,
    )
    .await;
    let deleted = delete_pods(store, &namespace, &result.pods_to_delete).await;
    unlabel_pods(store, &namespace, &result.pods_to_unlabel).await;

    if !result.pods_to_create.is_empty() || !result.pods_to_delete.is_empty() {
        info!(
            replicaset = ?name,
            created = created.succeeded,
            deleted = deleted.succeeded,
            failed = created.failed() + deleted.failed(),
            "Applied pod operations"
        );
    }
    if let Some(ref metrics) = ctx.metrics {
        metrics.record_pods_created(role.as_str(), created.succeeded);
        metrics.record_pods_deleted(role.as_str(), deleted.succeeded);
    }

    let mut status = result.status;
    update_condition(
        &mut status.conditions,
        ConditionType::PodsCreation,
        created.failed() > 0,
        "CreateFailed",
        &created.message(),
        now,
        false,
    );
    update_condition(
        &mut status.conditions,
        ConditionType::PodsDeletion,
        deleted.failed() > 0,
        "DeleteFailed",
        &deleted.message(),
        now,
        false,
    );

    if ers.status.as_ref() != Some(&status) {
        debug!(
            replicaset = ?name,
            desired = status.desired,
            current = status.current,
            ready = status.ready,
            "Updating ExtendedDaemonSetReplicaSet status"
        );
        ctx.store
            .replace_replicaset_status(&namespace, &name, &status)
            .await?;
    }

    let failed = created.failed() + deleted.failed();
    if failed > 0 {
        let messages = [created.message(), deleted.message()]
            .into_iter()
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ReconcileError::PodOperations { failed, messages });
    }

    Ok(Action::requeue(
        result
            .requeue_after
            .unwrap_or_else(|| reconcile_frequency(&eds)),
    ))
}
