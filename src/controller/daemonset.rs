pub mod generation;
pub mod reconcile;
pub mod status;

pub use generation::*;
pub use reconcile::*;
pub use status::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "daemonset_test.rs"]
mod tests;
