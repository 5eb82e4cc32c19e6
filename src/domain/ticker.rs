//! Ticker samples and live price aggregation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Latest price observed by a ticker feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerSample {
    /// Last trade price. `None` when the feed has nothing usable.
    pub price: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

impl TickerSample {
    #[must_use]
    pub fn new(price: Option<Decimal>, observed_at: DateTime<Utc>) -> Self {
        Self { price, observed_at }
    }

    /// Price if strictly positive.
    #[must_use]
    pub fn usable_price(&self) -> Option<Decimal> {
        self.price.filter(|p| *p > Decimal::ZERO)
    }
}

/// Point-in-time status of a ticker feed, used for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TickerStatus {
    pub name: String,
    pub is_connected: bool,
    pub last_sample: Option<TickerSample>,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
    pub poll_error_count: u64,
}

/// Median of the usable prices among `samples`.
///
/// Absent and non-positive prices are excluded first. An even count yields
/// the mean of the two middle prices. Returns `None` when nothing remains.
#[must_use]
pub fn median_price<'a, I>(samples: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Option<&'a TickerSample>>,
{
    let mut prices: Vec<Decimal> = samples
        .into_iter()
        .flatten()
        .filter_map(TickerSample::usable_price)
        .collect();

    if prices.is_empty() {
        return None;
    }

    prices.sort();
    let mid = prices.len() / 2;
    if prices.len() % 2 == 0 {
        Some((prices[mid - 1] + prices[mid]) / Decimal::TWO)
    } else {
        Some(prices[mid])
    }
}
