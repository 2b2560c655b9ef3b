//! Annotation and label keys shared by the controllers
//!
//! All boolean annotations use the literal values `"true"` / `"false"`.

/// Forces the canary into the paused state
pub const ANNOTATION_CANARY_PAUSED: &str = "eds.kulta.io/canary-paused";

/// Free-text reason attached to a manual canary pause
pub const ANNOTATION_CANARY_PAUSED_REASON: &str = "eds.kulta.io/canary-paused-reason";

/// Clears any canary pause (manual or automatic) for the current pass
pub const ANNOTATION_CANARY_UNPAUSED: &str = "eds.kulta.io/canary-unpaused";

/// Value is the name of the ExtendedDaemonSetReplicaSet to promote
pub const ANNOTATION_CANARY_VALID: &str = "eds.kulta.io/canary-valid";

/// Suppresses pod deletions during a rolling update
pub const ANNOTATION_ROLLING_UPDATE_PAUSED: &str = "eds.kulta.io/rollingupdate-paused";

/// Suppresses both pod creations and deletions
pub const ANNOTATION_ROLLOUT_FROZEN: &str = "eds.kulta.io/rollout-frozen";

/// Content hash of the pod template (on ExtendedDaemonSetReplicaSet and Pod)
pub const ANNOTATION_TEMPLATE_HASH: &str = "eds.kulta.io/templatehash";

/// Hash of the ExtendedDaemonSetSetting applied to a pod
pub const ANNOTATION_NODE_OVERRIDE_HASH: &str = "eds.kulta.io/nodeoverride-hash";

/// Unready pod count carried into a freshly created ExtendedDaemonSetReplicaSet
pub const ANNOTATION_OLD_UNREADY_PODS: &str = "eds.kulta.io/old-unready-pods";

/// Name of the owning ExtendedDaemonSet (on ExtendedDaemonSetReplicaSet and Pod)
pub const LABEL_EDS_NAME: &str = "eds.kulta.io/name";

/// Name of the ExtendedDaemonSetReplicaSet that created a pod
pub const LABEL_ERS_NAME: &str = "eds.kulta.io/replicaset";

/// Transient label set on pods created during the canary phase
pub const LABEL_CANARY: &str = "eds.kulta.io/canary";

/// Literal `"true"` annotation/label value
pub const VALUE_TRUE: &str = "true";

/// Value of an annotation, if set
pub fn annotation<'a>(meta: &'a kube::api::ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// True when the annotation is set to the literal `"true"`
pub fn is_annotation_true(meta: &kube::api::ObjectMeta, key: &str) -> bool {
    annotation(meta, key) == Some(VALUE_TRUE)
}
