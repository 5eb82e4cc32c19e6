//! Order matching: the pure engine and the job that drives it.

mod engine;
mod scheduler;

pub use engine::{match_order_book, GasCosts};
pub use scheduler::{MatchingRun, MatchingScheduler, MatchingSettings, MatchingStatus};
