//! Polling HTTP ticker feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::provider::{ParsedTicker, TickerProvider};
use crate::domain::{LogThrottle, TickerSample, TickerStatus};
use crate::error::Result;
use crate::port::TickerFeed;

/// Settings for one HTTP ticker.
#[derive(Debug, Clone)]
pub struct HttpTickerSettings {
    pub provider: TickerProvider,
    pub url: String,
    /// Zero polls once and stops.
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub log_error_again_after: chrono::Duration,
}

#[derive(Debug)]
struct FeedState {
    last_sample: Option<TickerSample>,
    is_connected: bool,
    error: Option<String>,
    poll_error_count: u64,
    started_at: chrono::DateTime<Utc>,
    error_log: LogThrottle,
}

/// Ticker feed that polls a public REST endpoint.
pub struct HttpTicker {
    settings: HttpTickerSettings,
    client: Client,
    state: RwLock<FeedState>,
}

impl HttpTicker {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: HttpTickerSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.fetch_timeout).build()?;
        let state = FeedState {
            last_sample: None,
            is_connected: false,
            error: None,
            poll_error_count: 0,
            started_at: Utc::now(),
            error_log: LogThrottle::new(settings.log_error_again_after),
        };
        Ok(Self {
            settings,
            client,
            state: RwLock::new(state),
        })
    }

    async fn fetch(&self) -> std::result::Result<ParsedTicker, String> {
        let response = self
            .client
            .get(&self.settings.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("fetch failed with status {status}"));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        self.settings.provider.parse(&body)
    }

    /// Fetch once and update the latest sample.
    pub async fn poll(&self) {
        let result = self.fetch().await;
        self.record(result);
    }

    fn record(&self, result: std::result::Result<ParsedTicker, String>) {
        let name = self.settings.provider.name();
        let now = Utc::now();
        let mut state = self.state.write();

        match result {
            Ok(parsed) => {
                if state.error.take().is_some() {
                    info!(ticker = name, "Ticker poll recovered");
                    state.error_log.reset();
                }
                state.is_connected = true;
                state.last_sample = Some(TickerSample::new(
                    parsed.last_trade_price,
                    parsed.time.unwrap_or(now),
                ));
                debug!(ticker = name, price = ?parsed.last_trade_price, "Ticker received");
            }
            Err(reason) => {
                state.poll_error_count += 1;
                state.is_connected = false;
                if state.error_log.should_log(&reason, now) {
                    error!(
                        ticker = name,
                        error = %reason,
                        poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
                        "Ticker poll failed; repeats of this error are suppressed for a while"
                    );
                }
                state.error = Some(reason);
            }
        }
    }

    /// Poll immediately, then on every interval until `shutdown` flips.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                ticker = self.settings.provider.name(),
                url = %self.settings.url,
                "Ticker polling started"
            );
            self.poll().await;
            if self.settings.poll_interval.is_zero() {
                return;
            }

            let mut interval = tokio::time::interval(self.settings.poll_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => self.poll().await,
                    _ = shutdown.changed() => {
                        debug!(ticker = self.settings.provider.name(), "Ticker polling stopped");
                        break;
                    }
                }
            }
        })
    }
}

impl TickerFeed for HttpTicker {
    fn name(&self) -> &str {
        self.settings.provider.name()
    }

    fn latest(&self) -> Option<TickerSample> {
        self.state.read().last_sample.clone()
    }

    fn status(&self) -> TickerStatus {
        let state = self.state.read();
        TickerStatus {
            name: self.name().to_string(),
            is_connected: state.is_connected,
            last_sample: state.last_sample.clone(),
            started_at: state.started_at,
            error: state.error.clone(),
            poll_error_count: state.poll_error_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker() -> HttpTicker {
        HttpTicker::new(HttpTickerSettings {
            provider: TickerProvider::Bitstamp,
            url: "http://127.0.0.1:1/ticker".into(),
            poll_interval: Duration::ZERO,
            fetch_timeout: Duration::from_millis(100),
            log_error_again_after: chrono::Duration::minutes(120),
        })
        .unwrap()
    }

    #[test]
    fn success_updates_latest_sample() {
        let feed = ticker();
        feed.record(Ok(ParsedTicker {
            last_trade_price: Some(dec!(187.3)),
            time: None,
        }));

        assert_eq!(feed.latest().and_then(|s| s.price), Some(dec!(187.3)));
        assert!(feed.status().is_connected);
    }

    #[test]
    fn failure_keeps_last_sample_and_counts_errors() {
        let feed = ticker();
        feed.record(Ok(ParsedTicker {
            last_trade_price: Some(dec!(187.3)),
            time: None,
        }));
        feed.record(Err("fetch failed with status 502".into()));
        feed.record(Err("fetch failed with status 502".into()));

        let status = feed.status();
        assert!(!status.is_connected);
        assert_eq!(status.poll_error_count, 2);
        assert_eq!(status.error.as_deref(), Some("fetch failed with status 502"));
        assert!(feed.latest().is_some());
    }

    #[test]
    fn recovery_clears_error() {
        let feed = ticker();
        feed.record(Err("timeout".into()));
        feed.record(Ok(ParsedTicker {
            last_trade_price: Some(dec!(1)),
            time: None,
        }));
        assert!(feed.status().error.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_records_error() {
        let feed = ticker();
        feed.poll().await;
        assert_eq!(feed.status().poll_error_count, 1);
        assert!(feed.latest().is_none());
    }
}
