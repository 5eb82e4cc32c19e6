//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe infrastructure dependencies such as the ledger
//! node and the external ticker feeds.

pub mod ledger;
pub mod ticker;
