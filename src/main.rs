use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use kulta_eds::config::ControllerConfig;
use kulta_eds::controller::cache::read_caches;
use kulta_eds::controller::{daemonset, replicaset, Context, ReconcileError};
use kulta_eds::crd::daemonset::ExtendedDaemonSet;
use kulta_eds::crd::keys::LABEL_EDS_NAME;
use kulta_eds::crd::replicaset::ExtendedDaemonSetReplicaSet;
use kulta_eds::crd::setting::ExtendedDaemonSetSetting;
use kulta_eds::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue delay after a failed pass
const ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue delay after an optimistic-concurrency conflict
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Retry delay for a failed pass; conflicts are retried sooner
pub fn requeue_for(error: &ReconcileError) -> Action {
    if error.is_conflict() {
        Action::requeue(CONFLICT_REQUEUE)
    } else {
        Action::requeue(ERROR_REQUEUE)
    }
}

/// Error policy of the ExtendedDaemonSet controller
///
/// Uses `warn!` since reconciliation errors are expected and trigger retries.
pub fn daemonset_error_policy(
    eds: Arc<ExtendedDaemonSet>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    if error.is_conflict() {
        debug!(eds = ?eds.name_any(), "Conflict, retrying");
    } else {
        warn!(eds = ?eds.name_any(), error = %error, "Reconcile error (will retry)");
    }
    requeue_for(error)
}

/// Error policy of the ExtendedDaemonSetReplicaSet controller
pub fn replicaset_error_policy(
    ers: Arc<ExtendedDaemonSetReplicaSet>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    if error.is_conflict() {
        debug!(replicaset = ?ers.name_any(), "Conflict, retrying");
    } else {
        warn!(replicaset = ?ers.name_any(), error = %error, "Reconcile error (will retry)");
    }
    requeue_for(error)
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Replica sets owned by the daemon set `eds_name` in `namespace`
fn replicasets_of(
    store: &Store<ExtendedDaemonSetReplicaSet>,
    namespace: Option<String>,
    eds_name: &str,
) -> Vec<ObjectRef<ExtendedDaemonSetReplicaSet>> {
    store
        .state()
        .into_iter()
        .filter(|ers| ers.namespace() == namespace)
        .filter(|ers| ers.labels().get(LABEL_EDS_NAME).map(String::as_str) == Some(eds_name))
        .map(|ers| ObjectRef::from_obj(&*ers))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting ExtendedDaemonSet controller");

    let config = ControllerConfig::from_env()?;
    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        "Connected to Kubernetes cluster"
    );

    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_port = config.health_port;
    let health_handle = tokio::spawn(async move {
        if let Err(e) =
            run_health_server(health_port, health_readiness, health_metrics, shutdown_signal).await
        {
            warn!(error = %e, "Health server failed");
        }
    });

    let namespace = config.watch_namespace.as_deref();
    let daemonsets: Api<ExtendedDaemonSet> = scoped_api(client.clone(), namespace);
    let replicasets: Api<ExtendedDaemonSetReplicaSet> = scoped_api(client.clone(), namespace);
    let pods: Api<Pod> = scoped_api(client.clone(), namespace);
    let settings: Api<ExtendedDaemonSetSetting> = scoped_api(client.clone(), namespace);
    let nodes: Api<Node> = Api::all(client.clone());

    let (caches, cache_watches) = read_caches(nodes.clone(), pods.clone(), settings);
    tokio::spawn(cache_watches);
    caches.wait_until_ready().await?;
    info!("Node, pod and setting caches synced");

    let ctx = Arc::new(Context::new(client.clone(), caches, Some(metrics)));

    let eds_controller = Controller::new(daemonsets.clone(), watcher::Config::default())
        .owns(replicasets.clone(), watcher::Config::default())
        .run(daemonset::reconcile, daemonset_error_policy, ctx.clone())
        .for_each(|res| async move {
            if let Ok((obj, _)) = res {
                debug!(eds = %obj.name, "Reconciled");
            }
        });

    // The replica set controller also reacts to its daemon set (role changes) and to
    // node changes (eligibility); both map through its own cache.
    let ers_controller = Controller::new(replicasets, watcher::Config::default());
    let by_daemonset = ers_controller.store();
    let by_node = ers_controller.store();
    let ers_controller = ers_controller
        .owns(pods, watcher::Config::default().labels(LABEL_EDS_NAME))
        .watches(daemonsets, watcher::Config::default(), move |eds: ExtendedDaemonSet| {
            replicasets_of(&by_daemonset, eds.namespace(), &eds.name_any())
        })
        .watches(nodes, watcher::Config::default(), move |_node: Node| {
            by_node
                .state()
                .into_iter()
                .map(|ers| ObjectRef::from_obj(&*ers))
                .collect::<Vec<_>>()
        })
        .run(replicaset::reconcile, replicaset_error_policy, ctx)
        .for_each(|res| async move {
            if let Ok((obj, _)) = res {
                debug!(replicaset = %obj.name, "Reconciled");
            }
        });

    readiness.set_ready();
    info!("Controllers ready, starting reconciliation loops");

    tokio::select! {
        _ = eds_controller => {
            info!("ExtendedDaemonSet controller stream ended");
        }
        _ = ers_controller => {
            info!("ExtendedDaemonSetReplicaSet controller stream ended");
        }
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Cannot listen for signals, shutting down"),
            }
            readiness.set_not_ready();
        }
    }

    shutdown_controller.shutdown();
    if tokio::time::timeout(Duration::from_secs(5), health_handle)
        .await
        .is_err()
    {
        warn!("Health server did not stop in time");
    }

    info!("ExtendedDaemonSet controller shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
