//! Prometheus metrics for the controllers
//!
//! One registry per process, shared between the reconcilers (which record) and the
//! `/metrics` endpoint (which encodes).

use crate::crd::daemonset::DaemonSetState;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Registered controller metrics
pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_duration: HistogramVec,
    pods_created: IntCounterVec,
    pods_deleted: IntCounterVec,
    daemonset_state: IntGaugeVec,
}

pub type SharedMetrics = Arc<ControllerMetrics>;

const STATES: &[(DaemonSetState, &str)] = &[
    (DaemonSetState::Running, "Running"),
    (DaemonSetState::Canary, "Canary"),
    (DaemonSetState::CanaryPaused, "CanaryPaused"),
    (DaemonSetState::CanaryFailed, "CanaryFailed"),
    (DaemonSetState::RollingUpdatePaused, "RollingUpdatePaused"),
    (DaemonSetState::RolloutFrozen, "RolloutFrozen"),
];

/// Build the registry and register every metric
///
/// # Errors
/// Returns the prometheus error if a metric is invalid or registered twice
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let reconciliations = IntCounterVec::new(
        Opts::new(
            "eds_reconciliations_total",
            "Reconcile passes by controller and result",
        ),
        &["controller", "result"],
    )?;
    registry.register(Box::new(reconciliations.clone()))?;

    let reconcile_duration = HistogramVec::new(
        HistogramOpts::new(
            "eds_reconcile_duration_seconds",
            "Duration of reconcile passes",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["controller"],
    )?;
    registry.register(Box::new(reconcile_duration.clone()))?;

    let pods_created = IntCounterVec::new(
        Opts::new("eds_pods_created_total", "Pods created by replica set role"),
        &["role"],
    )?;
    registry.register(Box::new(pods_created.clone()))?;

    let pods_deleted = IntCounterVec::new(
        Opts::new("eds_pods_deleted_total", "Pods deleted by replica set role"),
        &["role"],
    )?;
    registry.register(Box::new(pods_deleted.clone()))?;

    let daemonset_state = IntGaugeVec::new(
        Opts::new(
            "eds_daemonset_state",
            "1 for the current state of each ExtendedDaemonSet, 0 for the others",
        ),
        &["namespace", "name", "state"],
    )?;
    registry.register(Box::new(daemonset_state.clone()))?;

    Ok(Arc::new(ControllerMetrics {
        registry,
        reconciliations,
        reconcile_duration,
        pods_created,
        pods_deleted,
        daemonset_state,
    }))
}

impl ControllerMetrics {
    pub fn record_reconciliation_success(&self, controller: &str, duration_secs: f64) {
        self.reconciliations
            .with_label_values(&[controller, "success"])
            .inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(duration_secs);
    }

    pub fn record_reconciliation_error(&self, controller: &str, duration_secs: f64) {
        self.reconciliations
            .with_label_values(&[controller, "error"])
            .inc();
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(duration_secs);
    }

    pub fn record_pods_created(&self, role: &str, count: usize) {
        self.pods_created
            .with_label_values(&[role])
            .inc_by(count as u64);
    }

    pub fn record_pods_deleted(&self, role: &str, count: usize) {
        self.pods_deleted
            .with_label_values(&[role])
            .inc_by(count as u64);
    }

    /// Set the state gauge of one daemon set
    pub fn set_daemonset_state(&self, namespace: &str, name: &str, state: &DaemonSetState) {
        for (candidate, label) in STATES {
            let value = i64::from(candidate == state);
            self.daemonset_state
                .with_label_values(&[namespace, name, label])
                .set(value);
        }
    }

    /// Encode every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
