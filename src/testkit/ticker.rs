//! Ticker feeds with scripted prices.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::{TickerSample, TickerStatus};
use crate::port::TickerFeed;

/// [`TickerFeed`] returning whatever sample was set last.
pub struct StaticTicker {
    name: String,
    started_at: DateTime<Utc>,
    sample: RwLock<Option<TickerSample>>,
}

impl StaticTicker {
    #[must_use]
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            started_at: Utc::now(),
            sample: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_price(name: &str, price: Decimal) -> Arc<Self> {
        let ticker = Self::new(name);
        ticker.set_price(Some(price));
        ticker
    }

    /// Replace the latest sample. `None` records a sample without a price.
    pub fn set_price(&self, price: Option<Decimal>) {
        *self.sample.write() = Some(TickerSample::new(price, Utc::now()));
    }

    /// Forget the latest sample, as before a first fetch.
    pub fn clear(&self) {
        *self.sample.write() = None;
    }
}

impl TickerFeed for StaticTicker {
    fn name(&self) -> &str {
        &self.name
    }

    fn latest(&self) -> Option<TickerSample> {
        self.sample.read().clone()
    }

    fn status(&self) -> TickerStatus {
        let last_sample = self.latest();
        TickerStatus {
            name: self.name.clone(),
            is_connected: last_sample.is_some(),
            last_sample,
            started_at: self.started_at,
            error: None,
            poll_error_count: 0,
        }
    }
}
