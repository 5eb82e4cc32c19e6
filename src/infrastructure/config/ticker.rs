//! Ticker feed configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::adapter::outbound::ticker::{HttpTickerSettings, TickerProvider};

/// One `[[tickers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerConfig {
    pub provider: TickerProvider,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Poll interval (milliseconds). 0 fetches once.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Minutes before an identical poll error is logged again.
    #[serde(default = "default_log_error_again_after_mins")]
    pub log_error_again_after_mins: i64,
}

fn default_poll_interval_ms() -> u64 {
    120_000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_log_error_again_after_mins() -> i64 {
    120
}

impl TickerConfig {
    #[must_use]
    pub fn new(provider: TickerProvider) -> Self {
        Self {
            provider,
            url: None,
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            log_error_again_after_mins: default_log_error_again_after_mins(),
        }
    }

    /// Resolve runtime settings for a feed quoting ETH in `symbol`.
    #[must_use]
    pub fn settings(&self, symbol: &str) -> HttpTickerSettings {
        HttpTickerSettings {
            provider: self.provider,
            url: self
                .url
                .clone()
                .unwrap_or_else(|| self.provider.default_url(symbol)),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            log_error_again_after: chrono::Duration::minutes(self.log_error_again_after_mins),
        }
    }
}

/// Feeds used when the config names none.
#[must_use]
pub fn default_tickers() -> Vec<TickerConfig> {
    vec![
        TickerConfig::new(TickerProvider::Kraken),
        TickerConfig::new(TickerProvider::Bitstamp),
        TickerConfig::new(TickerProvider::Coinbase),
    ]
}
