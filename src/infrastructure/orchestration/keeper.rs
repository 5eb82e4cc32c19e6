//! Component wiring for the keeper process.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::outbound::ledger::WsTransport;
use crate::adapter::outbound::ticker::HttpTicker;
use crate::application::matching::{GasCosts, MatchingScheduler, MatchingSettings};
use crate::application::rates::{RateScheduler, RateSettings};
use crate::application::status::{StatusReporter, StatusWriter};
use crate::application::transaction::TransactionPipeline;
use crate::error::{ConfigError, LedgerError, Result};
use crate::infrastructure::config::{Config, StatusConfig};
use crate::infrastructure::ledger::LedgerConnection;
use crate::port::{LedgerRpc, RpcTransport, TickerFeed};

/// Every long-lived component of a running keeper.
pub struct Keeper {
    connection: LedgerConnection,
    matching: Option<Arc<MatchingScheduler>>,
    rates: Option<Arc<RateScheduler>>,
    pollers: Vec<Arc<HttpTicker>>,
    reporter: Arc<StatusReporter>,
    status: StatusConfig,
}

impl Keeper {
    /// Wire a keeper that talks to the configured node over WebSocket and
    /// polls the configured HTTP tickers.
    ///
    /// # Errors
    ///
    /// Returns an error if a required signing key is missing or invalid, or
    /// a ticker client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn RpcTransport> = Arc::new(WsTransport::new(config.ledger.url.clone()));

        let mut pollers = Vec::new();
        if config.rates.enabled {
            for ticker in &config.tickers {
                let feed = HttpTicker::new(ticker.settings(&config.contracts.symbol))?;
                pollers.push(Arc::new(feed));
            }
        }
        let feeds = pollers
            .iter()
            .map(|feed| Arc::clone(feed) as Arc<dyn TickerFeed>)
            .collect();

        let mut keeper = Self::with_transport(config, transport, feeds)?;
        keeper.pollers = pollers;
        Ok(keeper)
    }

    /// Wire a keeper over any transport with externally driven ticker feeds.
    ///
    /// # Errors
    ///
    /// Returns an error if a required signing key is missing or invalid.
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn RpcTransport>,
        feeds: Vec<Arc<dyn TickerFeed>>,
    ) -> Result<Self> {
        let connection = LedgerConnection::new(transport, config.ledger.clone());
        let rpc: Arc<dyn LedgerRpc> = Arc::new(connection.clone());

        let matching = if config.matching.enabled {
            let pipeline = Arc::new(TransactionPipeline::new(
                Arc::clone(&rpc),
                config.matchmaker_signer()?,
                config.transactions.clone(),
            ));
            let settings = MatchingSettings {
                exchange: required(config.exchange_address(), "contracts.exchange")?,
                rates: required(config.rates_address(), "contracts.rates")?,
                symbol: config.contracts.symbol.clone(),
                order_chunk_size: config.contracts.order_chunk_size,
                gas_costs: GasCosts {
                    first_match: config.matching.first_match_gas,
                    additional_match: config.matching.additional_match_gas,
                },
                timeout: config.matching.timeout(),
            };
            info!(
                exchange = %settings.exchange,
                account = %pipeline.account(),
                "Matching job enabled"
            );
            Some(MatchingScheduler::new(connection.clone(), pipeline, settings))
        } else {
            None
        };

        let rates = if config.rates.enabled {
            let pipeline = Arc::new(TransactionPipeline::new(
                Arc::clone(&rpc),
                config.ratesfeeder_signer()?,
                config.transactions.clone(),
            ));
            let settings = RateSettings {
                rates: required(config.rates_address(), "contracts.rates")?,
                symbol: config.contracts.symbol.clone(),
                token: config.contracts.token,
                decimals: config.contracts.token_decimals,
                threshold_pct: config.rates.threshold_pct,
                set_rate_gas_limit: config.rates.set_rate_gas_limit,
                check_interval: config.rates.check_interval(),
                timeout: config.rates.timeout(),
                log_gap_again_after: config.rates.log_gap_again_after(),
            };
            info!(
                rates = %settings.rates,
                symbol = %settings.symbol,
                account = %pipeline.account(),
                tickers = feeds.len(),
                "Rates job enabled"
            );
            Some(RateScheduler::new(connection.clone(), pipeline, feeds, settings))
        } else {
            None
        };

        if matching.is_none() && rates.is_none() {
            warn!("Both jobs are disabled; the keeper will only hold the node connection");
        }

        let reporter = Arc::new(StatusReporter::new(
            connection.clone(),
            matching.clone(),
            rates.clone(),
        ));

        Ok(Self {
            connection,
            matching,
            rates,
            pollers: Vec::new(),
            reporter,
            status: config.status.clone(),
        })
    }

    #[must_use]
    pub fn connection(&self) -> &LedgerConnection {
        &self.connection
    }

    #[must_use]
    pub fn matching(&self) -> Option<&Arc<MatchingScheduler>> {
        self.matching.as_ref()
    }

    #[must_use]
    pub fn rates(&self) -> Option<&Arc<RateScheduler>> {
        self.rates.as_ref()
    }

    #[must_use]
    pub fn reporter(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    /// Start every background task. Schedulers subscribe to connection
    /// events here, so call this before [`Keeper::connect`].
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks: Vec<JoinHandle<()>> = self
            .pollers
            .iter()
            .map(|feed| Arc::clone(feed).spawn(shutdown.clone()))
            .collect();

        if let Some(matching) = &self.matching {
            tasks.push(Arc::clone(matching).spawn(shutdown.clone()));
        }
        if let Some(rates) = &self.rates {
            tasks.push(Arc::clone(rates).spawn(shutdown.clone()));
        }

        let writer = StatusWriter::new(self.status.path.clone());
        info!(path = %writer.path().display(), "Writing status file");
        tasks.push(writer.spawn(
            Arc::clone(&self.reporter),
            self.status.interval(),
            shutdown.clone(),
        ));

        tasks
    }

    /// Open the first node connection.
    ///
    /// # Errors
    ///
    /// Returns the connect failure. Later drops are retried by the
    /// connection itself.
    pub async fn connect(&self) -> std::result::Result<(), LedgerError> {
        self.connection.connect().await
    }

    /// Close the node connection and wait for `tasks` to finish. The caller
    /// must have flipped the shutdown channel already.
    pub async fn shutdown(&self, tasks: Vec<JoinHandle<()>>) {
        self.connection.stop().await;
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("All background tasks stopped");
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or_else(|| ConfigError::MissingField { field }.into())
}
