//! Outbound adapters (driven side).

pub mod contracts;
pub mod ledger;
pub mod ticker;
