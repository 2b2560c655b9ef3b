//! Custom resource definitions
//!
//! - `ExtendedDaemonSet`: the user-facing daemon rollout
//! - `ExtendedDaemonSetReplicaSet`: one immutable pod-template generation of a daemon set
//! - `ExtendedDaemonSetSetting`: per-node container resource overrides

pub mod condition;
pub mod daemonset;
pub mod keys;
pub mod replicaset;
pub mod setting;
