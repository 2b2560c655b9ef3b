use super::*;
use crate::controller::clock::MockClock;
use crate::controller::context::Context;
use crate::controller::error::ReconcileError;
use crate::controller::fixtures::{daemonset, labels, node, replicaset, template, ts};
use crate::controller::podtemplate::compute_template_hash;
use crate::controller::store::MockStore;
use crate::crd::condition::{is_condition_true, Condition, ConditionStatus, ConditionType};
use crate::crd::daemonset::{
    CanaryConfig, CanaryStatus, DaemonSetState, ExtendedDaemonSet, ExtendedDaemonSetStatus,
};
use crate::crd::keys::{
    ANNOTATION_CANARY_VALID, ANNOTATION_OLD_UNREADY_PODS, ANNOTATION_ROLLOUT_FROZEN,
    LABEL_EDS_NAME,
};
use crate::crd::replicaset::{
    ExtendedDaemonSetReplicaSet, ExtendedDaemonSetReplicaSetStatus, ReplicaSetRole,
};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

fn start() -> DateTime<Utc> {
    ts("2024-01-01T00:00:00Z")
}

fn hash_of(eds: &ExtendedDaemonSet) -> String {
    compute_template_hash(&eds.spec.template).unwrap()
}

fn with_counts(
    mut ers: ExtendedDaemonSetReplicaSet,
    role: ReplicaSetRole,
    counts: (i32, i32, i32, i32),
) -> ExtendedDaemonSetReplicaSet {
    let (desired, current, ready, available) = counts;
    let conditions = ers.status.take().map(|s| s.conditions).unwrap_or_default();
    ers.status = Some(ExtendedDaemonSetReplicaSetStatus {
        status: role,
        desired,
        current,
        ready,
        available,
        ignored_unresponsive_nodes: 0,
        conditions,
    });
    ers
}

fn with_condition(
    mut ers: ExtendedDaemonSetReplicaSet,
    type_: ConditionType,
    since: DateTime<Utc>,
    reason: &str,
) -> ExtendedDaemonSetReplicaSet {
    let status = ers.status.get_or_insert_with(Default::default);
    status.conditions.push(Condition {
        type_,
        status: ConditionStatus::True,
        last_transition_time: Some(since.to_rfc3339()),
        last_update_time: Some(since.to_rfc3339()),
        reason: Some(reason.to_string()),
        message: None,
    });
    ers
}

/// A daemon set mid-rollout: `agent-old` is active, the spec carries the v2 template
fn rollout(canary: Option<CanaryConfig>) -> (ExtendedDaemonSet, ExtendedDaemonSetReplicaSet) {
    let old_eds = daemonset("agent", "agent:v1");
    let old = with_counts(
        replicaset(&old_eds, "agent-old", &hash_of(&old_eds), start()),
        ReplicaSetRole::Active,
        (3, 3, 3, 3),
    );

    let mut eds = daemonset("agent", "agent:v2");
    eds.spec.strategy.canary = canary;
    eds.status = Some(ExtendedDaemonSetStatus {
        active_replica_set: Some("agent-old".to_string()),
        ..Default::default()
    });
    (eds, old)
}

fn nodes(count: usize) -> Vec<k8s_openapi::api::core::v1::Node> {
    (1..=count).map(|i| node(&format!("node-{}", i), &[])).collect()
}

fn ctx(store: &Arc<MockStore>, now: DateTime<Utc>) -> Arc<Context> {
    Arc::new(Context::new_mock(store.clone(), Arc::new(MockClock::new(now))))
}

async fn run(
    store: &Arc<MockStore>,
    now: DateTime<Utc>,
) -> Result<Action, ReconcileError> {
    let eds = store.daemonset("default", "agent").expect("daemon set in store");
    reconcile(Arc::new(eds), ctx(store, now)).await
}

fn stored_status(store: &MockStore) -> ExtendedDaemonSetStatus {
    store
        .daemonset("default", "agent")
        .and_then(|eds| eds.status)
        .expect("status written")
}

#[tokio::test]
async fn test_template_change_creates_up_to_date_replicaset() {
    let (eds, old) = rollout(None);
    let old = with_counts(old, ReplicaSetRole::Active, (3, 3, 1, 1));
    let hash = hash_of(&eds);
    let store = Arc::new(MockStore::new().with_daemonset(eds).with_replicaset(old));

    let action = run(&store, start()).await.unwrap();

    assert_eq!(action, Action::requeue(REQUEUE_AFTER_CREATE));
    let name = format!("agent-{}", hash);
    assert_eq!(store.writes(), vec![format!("create replicaset {}", name)]);

    let created = store.replicaset("default", &name).unwrap();
    assert_eq!(created.spec.template_generation, hash);
    assert_eq!(created.labels().get(LABEL_EDS_NAME).map(String::as_str), Some("agent"));
    assert_eq!(
        created.annotations().get(ANNOTATION_OLD_UNREADY_PODS).map(String::as_str),
        Some("2")
    );
    assert_eq!(
        created.metadata.owner_references.as_ref().map(|o| o[0].name.as_str()),
        Some("agent")
    );
}

#[tokio::test]
async fn test_first_generation_becomes_active() {
    let eds = daemonset("agent", "agent:v1");
    let ers = replicaset(&eds, "agent-v1", &hash_of(&eds), start());
    let store = Arc::new(MockStore::new().with_daemonset(eds).with_replicaset(ers));

    let action = run(&store, start()).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    let status = stored_status(&store);
    assert_eq!(status.active_replica_set.as_deref(), Some("agent-v1"));
    assert_eq!(status.state, Some(DaemonSetState::Running));
    assert_eq!(status.canary, None);
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let (eds, old) = rollout(Some(CanaryConfig {
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    let new = replicaset(&eds, "agent-new", &hash_of(&eds), start());
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(3)),
    );

    run(&store, ts("2024-01-01T00:01:00Z")).await.unwrap();
    assert_eq!(store.writes(), vec!["status daemonset agent"]);

    store.clear_writes();
    run(&store, ts("2024-01-01T00:02:00Z")).await.unwrap();
    assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());
}

#[tokio::test]
async fn test_active_replicaset_always_names_an_owned_generation() {
    let mut eds = daemonset("agent", "agent:v1");
    eds.status = Some(ExtendedDaemonSetStatus {
        active_replica_set: Some("agent-deleted".to_string()),
        ..Default::default()
    });
    let ers = replicaset(&eds, "agent-v1", &hash_of(&eds), start());
    let store = Arc::new(MockStore::new().with_daemonset(eds).with_replicaset(ers));

    run(&store, start()).await.unwrap();

    let active = stored_status(&store).active_replica_set.unwrap();
    let owned: Vec<String> = store.replicasets().iter().map(|r| r.name_any()).collect();
    assert!(owned.contains(&active));
}

#[tokio::test]
async fn test_canary_phase_selects_nodes_and_keeps_old_active() {
    let (mut eds, old) = rollout(Some(CanaryConfig {
        replicas: Some(IntOrString::Int(2)),
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    eds.spec.strategy.reconcile_frequency = Some("1h".to_string());
    let new = replicaset(&eds, "agent-new", &hash_of(&eds), start());
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(4)),
    );

    let action = run(&store, ts("2024-01-01T00:04:00Z")).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(6 * 60)));
    let status = stored_status(&store);
    assert_eq!(status.active_replica_set.as_deref(), Some("agent-old"));
    assert_eq!(status.state, Some(DaemonSetState::Canary));
    assert_eq!(
        status.canary,
        Some(CanaryStatus {
            replica_set: "agent-new".to_string(),
            nodes: vec!["node-1".to_string(), "node-2".to_string()],
        })
    );
    assert!(is_condition_true(&status.conditions, ConditionType::Canary));
}

#[tokio::test]
async fn test_canary_promoted_once_duration_elapsed() {
    let (eds, old) = rollout(Some(CanaryConfig {
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    let new = replicaset(&eds, "agent-new", &hash_of(&eds), start());
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(3)),
    );

    run(&store, ts("2024-01-01T00:11:00Z")).await.unwrap();

    let status = stored_status(&store);
    assert_eq!(status.active_replica_set.as_deref(), Some("agent-new"));
    assert_eq!(status.state, Some(DaemonSetState::Running));
    assert_eq!(status.canary, None);
}

#[tokio::test]
async fn test_canary_valid_annotation_promotes_immediately() {
    let (mut eds, old) = rollout(Some(CanaryConfig {
        duration: Some("1h".to_string()),
        ..Default::default()
    }));
    eds.metadata.annotations = Some(labels(&[(ANNOTATION_CANARY_VALID, "agent-new")]));
    let new = replicaset(&eds, "agent-new", &hash_of(&eds), start());
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(3)),
    );

    run(&store, ts("2024-01-01T00:01:00Z")).await.unwrap();

    assert_eq!(
        stored_status(&store).active_replica_set.as_deref(),
        Some("agent-new")
    );
}

#[tokio::test]
async fn test_paused_canary_is_not_promoted() {
    let (eds, old) = rollout(Some(CanaryConfig {
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    let new = with_condition(
        replicaset(&eds, "agent-new", &hash_of(&eds), start()),
        ConditionType::CanaryPaused,
        ts("2024-01-01T00:03:00Z"),
        "ImagePullBackOff",
    );
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(3)),
    );

    run(&store, ts("2024-01-01T00:30:00Z")).await.unwrap();

    let status = stored_status(&store);
    assert_eq!(status.active_replica_set.as_deref(), Some("agent-old"));
    assert_eq!(status.state, Some(DaemonSetState::CanaryPaused));
    assert_eq!(status.reason.as_deref(), Some("ImagePullBackOff"));
}

#[tokio::test]
async fn test_failed_canary_rolls_template_back() {
    let (eds, old) = rollout(Some(CanaryConfig {
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    let new = with_condition(
        replicaset(&eds, "agent-new", &hash_of(&eds), start()),
        ConditionType::CanaryFailed,
        ts("2024-01-01T00:05:00Z"),
        "Error",
    );
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(3)),
    );

    run(&store, ts("2024-01-01T00:05:00Z")).await.unwrap();

    assert_eq!(
        store.writes(),
        vec!["status daemonset agent", "update daemonset agent"]
    );
    let stored = store.daemonset("default", "agent").unwrap();
    assert_eq!(stored.spec.template, template("agent:v1"));
    let status = stored.status.unwrap();
    assert_eq!(status.state, Some(DaemonSetState::CanaryFailed));
    assert_eq!(status.reason.as_deref(), Some("Error"));
    assert_eq!(status.active_replica_set.as_deref(), Some("agent-old"));
    assert_eq!(status.canary, None);
}

#[tokio::test]
async fn test_failed_replicaset_collected_after_grace_period() {
    let eds = daemonset("agent", "agent:v1");
    let active = with_counts(
        replicaset(&eds, "agent-v1", &hash_of(&eds), start()),
        ReplicaSetRole::Active,
        (3, 3, 3, 3),
    );
    let failed = with_counts(
        with_condition(
            replicaset(&eds, "agent-failed", "failedhash", start()),
            ConditionType::CanaryFailed,
            start(),
            "Error",
        ),
        ReplicaSetRole::Unknown,
        (0, 1, 0, 0),
    );
    let mut eds = eds;
    eds.status = Some(ExtendedDaemonSetStatus {
        active_replica_set: Some("agent-v1".to_string()),
        ..Default::default()
    });
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(active)
            .with_replicaset(failed),
    );

    run(&store, ts("2024-01-01T00:01:00Z")).await.unwrap();
    assert!(store.replicaset("default", "agent-failed").is_some());

    run(&store, ts("2024-01-01T00:03:00Z")).await.unwrap();
    assert!(store.replicaset("default", "agent-failed").is_none());
    assert!(store
        .writes()
        .contains(&"delete replicaset agent-failed".to_string()));
}

#[tokio::test]
async fn test_empty_stale_replicaset_is_deleted() {
    let (mut eds, old) = rollout(None);
    let new = with_counts(
        replicaset(&eds, "agent-new", &hash_of(&eds), start()),
        ReplicaSetRole::Active,
        (3, 3, 3, 3),
    );
    let old = with_counts(old, ReplicaSetRole::Unknown, (0, 0, 0, 0));
    eds.status = Some(ExtendedDaemonSetStatus {
        active_replica_set: Some("agent-new".to_string()),
        ..Default::default()
    });
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new),
    );

    run(&store, start()).await.unwrap();

    assert!(store.replicaset("default", "agent-old").is_none());
    let status = stored_status(&store);
    assert_eq!(status.desired, 3);
    assert_eq!(status.up_to_date, 3);
}

#[tokio::test]
async fn test_canary_node_shortage_is_reported() {
    let (eds, old) = rollout(Some(CanaryConfig {
        replicas: Some(IntOrString::Int(5)),
        duration: Some("10m".to_string()),
        ..Default::default()
    }));
    let new = replicaset(&eds, "agent-new", &hash_of(&eds), start());
    let store = Arc::new(
        MockStore::new()
            .with_daemonset(eds)
            .with_replicaset(old)
            .with_replicaset(new)
            .with_nodes(nodes(2)),
    );

    let err = run(&store, ts("2024-01-01T00:01:00Z")).await.unwrap_err();

    assert!(matches!(err, ReconcileError::NodeSelection(_)));
    let status = stored_status(&store);
    assert!(is_condition_true(&status.conditions, ConditionType::CanaryNodeSelection));
    assert!(is_condition_true(&status.conditions, ConditionType::ReconcileError));
    assert_eq!(status.canary.map(|c| c.nodes), Some(Vec::new()));
}

#[tokio::test]
async fn test_frozen_rollout_state() {
    let eds = daemonset("agent", "agent:v1");
    let ers = replicaset(&eds, "agent-v1", &hash_of(&eds), start());
    let mut eds = eds;
    eds.metadata.annotations = Some(labels(&[(ANNOTATION_ROLLOUT_FROZEN, "true")]));
    let store = Arc::new(MockStore::new().with_daemonset(eds).with_replicaset(ers));

    run(&store, start()).await.unwrap();

    assert_eq!(stored_status(&store).state, Some(DaemonSetState::RolloutFrozen));
}

#[tokio::test]
async fn test_invalid_spec_is_rejected() {
    let mut eds = daemonset("agent", "agent:v1");
    eds.spec.min_ready_seconds = -1;
    let store = Arc::new(MockStore::new().with_daemonset(eds));

    let err = run(&store, start()).await.unwrap_err();

    assert!(matches!(err, ReconcileError::ValidationError(_)));
    assert!(store.writes().is_empty());
}
