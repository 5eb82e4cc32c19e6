//! Process orchestration.
//!
//! Wires the connection, jobs, ticker feeds and status writer together and
//! owns their shutdown.

mod keeper;
mod runtime;

pub use keeper::Keeper;
pub use runtime::{run, run_until, shutdown_within};
