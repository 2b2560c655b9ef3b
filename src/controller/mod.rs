//! ExtendedDaemonSet controllers
//!
//! Two reconcilers share one `Context`:
//! - `daemonset`: per ExtendedDaemonSet, manages replica set generations, the canary
//!   phase and the aggregated status
//! - `replicaset`: per ExtendedDaemonSetReplicaSet, runs the role strategy and applies
//!   pod creations and deletions

pub mod cache;
pub mod canary_nodes;
pub mod clock;
pub mod conditions;
pub mod context;
pub mod daemonset;
pub mod error;
pub mod intstr;
pub mod limits;
pub mod podtemplate;
pub mod podutil;
pub mod replicaset;
pub mod scheduler;
pub mod store;
pub mod strategies;
pub mod validation;

#[cfg(test)]
pub mod fixtures;

pub use context::Context;
pub use error::ReconcileError;
