//! Application services (use cases).
//!
//! The two keeper jobs, the transaction pipeline they share, the
//! single-flight guard that serializes their runs, and status reporting.

pub mod guard;
pub mod matching;
pub mod rates;
pub mod status;
pub mod transaction;
