//! Ticker feed port.
//!
//! Feeds own their own transport and polling lifecycle. Consumers only read
//! the latest sample and a status snapshot.

use crate::domain::{TickerSample, TickerStatus};

/// Source of external market prices.
pub trait TickerFeed: Send + Sync {
    /// Feed name for logging and status, e.g. `Kraken`.
    fn name(&self) -> &str;

    /// Latest sample, or `None` before the first successful fetch.
    fn latest(&self) -> Option<TickerSample>;

    /// Status snapshot for reporting.
    fn status(&self) -> TickerStatus;
}
