pub mod podops;
pub mod reconcile;
pub mod snapshot;

pub use podops::*;
pub use reconcile::*;
pub use snapshot::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "replicaset_test.rs"]
mod tests;
