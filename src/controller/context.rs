use crate::controller::cache::ReadCaches;
use crate::controller::clock::{Clock, SystemClock};
use crate::controller::store::{ClusterStore, KubeStore};
use crate::server::SharedMetrics;
use std::sync::Arc;

/// Shared state handed to both reconcilers
pub struct Context {
    pub store: Arc<dyn ClusterStore>,
    pub clock: Arc<dyn Clock>,
    /// Optional controller metrics for Prometheus
    /// When Some, records reconciliation counts, durations and pod operations
    pub metrics: Option<SharedMetrics>,
}

impl Context {
    /// Context backed by the Kubernetes API, the watch caches and the system clock
    pub fn new(
        client: kube::Client,
        caches: ReadCaches,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        Context {
            store: Arc::new(KubeStore::new(client, caches)),
            clock: Arc::new(SystemClock),
            metrics,
        }
    }

    #[cfg(test)]
    pub fn new_mock(
        store: Arc<crate::controller::store::MockStore>,
        clock: Arc<crate::controller::clock::MockClock>,
    ) -> Self {
        Context {
            store,
            clock,
            metrics: None,
        }
    }
}
