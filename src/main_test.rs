use super::*;
use kulta_eds::controller::store::StoreError;

#[test]
fn test_failed_pass_requeues_after_ten_seconds() {
    let error = ReconcileError::ValidationError("minReadySeconds must be >= 0".to_string());
    assert_eq!(requeue_for(&error), Action::requeue(Duration::from_secs(10)));
}

#[test]
fn test_conflict_requeues_quickly() {
    let error = ReconcileError::StoreError(StoreError::Conflict(
        "ExtendedDaemonSet agent".to_string(),
    ));
    assert_eq!(requeue_for(&error), Action::requeue(Duration::from_secs(1)));
}

#[test]
fn test_pod_operation_failures_use_default_backoff() {
    let error = ReconcileError::PodOperations {
        failed: 2,
        messages: "pod a: not found; pod b: not found".to_string(),
    };
    assert_eq!(requeue_for(&error), Action::requeue(ERROR_REQUEUE));
}
