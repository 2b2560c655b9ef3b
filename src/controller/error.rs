use crate::controller::canary_nodes::NodeSelectionError;
use crate::controller::intstr::IntOrPercentError;
use crate::controller::store::StoreError;
use crate::controller::strategies::StrategyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Cluster store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("ExtendedDaemonSet missing namespace")]
    MissingNamespace,

    #[error("ExtendedDaemonSetReplicaSet missing name in metadata")]
    ReplicaSetMissingName,

    #[error("Failed to serialize pod template: {0}")]
    SerializationError(String),

    #[error("Invalid ExtendedDaemonSet spec: {0}")]
    ValidationError(String),

    #[error("Invalid int-or-percent value: {0}")]
    IntOrPercent(#[from] IntOrPercentError),

    #[error("Canary node selection failed: {0}")]
    NodeSelection(#[from] NodeSelectionError),

    #[error("Strategy reconciliation failed: {0}")]
    StrategyError(#[from] StrategyError),

    #[error("{failed} pod operation(s) failed: {messages}")]
    PodOperations { failed: usize, messages: String },
}

impl ReconcileError {
    /// Conflicts are expected under optimistic concurrency and retried quietly
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::StoreError(StoreError::Conflict(_)))
    }
}
