//! Informer-backed reads
//!
//! Nodes, daemon set pods and settings are read on every replica set pass. They
//! come from reflector caches fed by long-running watches instead of fresh lists.

use crate::crd::keys::LABEL_EDS_NAME;
use crate::crd::setting::ExtendedDaemonSetSetting;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::reflector::{self, reflector, store::WriterDropped, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::warn;

/// Reflector caches behind the replica set reads
#[derive(Clone)]
pub struct ReadCaches {
    nodes: Store<Node>,
    pods: Store<Pod>,
    settings: Store<ExtendedDaemonSetSetting>,
}

fn owned<K: Clone>(items: Vec<Arc<K>>) -> Vec<K> {
    items.into_iter().map(|item| (*item).clone()).collect()
}

impl ReadCaches {
    pub fn new(
        nodes: Store<Node>,
        pods: Store<Pod>,
        settings: Store<ExtendedDaemonSetSetting>,
    ) -> Self {
        Self {
            nodes,
            pods,
            settings,
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        owned(self.nodes.state())
    }

    /// Pods of `namespace` labelled with the daemon set name
    pub fn pods(&self, namespace: &str, eds_name: &str) -> Vec<Pod> {
        owned(
            self.pods
                .state()
                .into_iter()
                .filter(|pod| pod.namespace().as_deref() == Some(namespace))
                .filter(|pod| {
                    pod.labels().get(LABEL_EDS_NAME).map(String::as_str) == Some(eds_name)
                })
                .collect(),
        )
    }

    pub fn settings(&self, namespace: &str) -> Vec<ExtendedDaemonSetSetting> {
        owned(
            self.settings
                .state()
                .into_iter()
                .filter(|s| s.namespace().as_deref() == Some(namespace))
                .collect(),
        )
    }

    /// Resolves once every cache holds its initial list
    pub async fn wait_until_ready(&self) -> Result<(), WriterDropped> {
        self.nodes.wait_until_ready().await?;
        self.pods.wait_until_ready().await?;
        self.settings.wait_until_ready().await
    }
}

fn drive<K>(
    kind: &'static str,
    api: Api<K>,
    config: watcher::Config,
) -> (Store<K>, impl Stream<Item = ()> + Send)
where
    K: kube::Resource
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone + Send + Sync,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, config))
        .default_backoff()
        .applied_objects()
        .filter_map(move |res| async move {
            if let Err(e) = res {
                warn!(kind, error = %e, "Watch error (will retry)");
            }
            None::<()>
        });
    (reader, stream)
}

/// Start the watches behind the caches
///
/// The returned future runs them until the process exits.
pub fn read_caches(
    nodes: Api<Node>,
    pods: Api<Pod>,
    settings: Api<ExtendedDaemonSetSetting>,
) -> (ReadCaches, impl std::future::Future<Output = ()> + Send) {
    let (node_store, node_events) = drive("Node", nodes, watcher::Config::default());
    let (pod_store, pod_events) = drive(
        "Pod",
        pods,
        watcher::Config::default().labels(LABEL_EDS_NAME),
    );
    let (setting_store, setting_events) = drive(
        "ExtendedDaemonSetSetting",
        settings,
        watcher::Config::default(),
    );

    let events = futures::stream::select(
        node_events,
        futures::stream::select(pod_events, setting_events),
    )
    .for_each(|()| async {});

    (ReadCaches::new(node_store, pod_store, setting_store), events)
}

#[cfg(test)]
#[path = "cache_test.rs"]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests;
