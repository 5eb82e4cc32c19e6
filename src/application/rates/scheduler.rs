//! Rates feeding job.
//!
//! Compares the on-chain rate with the median of the ticker feeds and
//! submits `setRate` when they drift apart by more than the threshold.
//! Checks run on a fixed interval and on every `Connected`, through a
//! [`SingleFlight`] guard.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::outbound::contracts::rates::{self, StoredRate};
use crate::application::guard::{Job, RunRecord, SingleFlight, Trigger};
use crate::application::transaction::TransactionPipeline;
use crate::domain::{median_price, ConnectionEvent, ConnectionState, LogThrottle, TickerStatus, TxOutcome};
use crate::error::{Result, TxError};
use crate::infrastructure::ledger::LedgerConnection;
use crate::port::TickerFeed;

const NO_LIVE_PRICE: &str = "no live price from any ticker";

/// Static inputs of the rates job.
#[derive(Debug, Clone)]
pub struct RateSettings {
    pub rates: Address,
    pub symbol: String,
    /// Token whose `decimals()` scales the stored rate. Without one,
    /// `decimals` is used as is.
    pub token: Option<Address>,
    pub decimals: u32,
    /// Minimum deviation in percent that triggers an update.
    pub threshold_pct: Decimal,
    pub set_rate_gas_limit: u64,
    /// `None` disables the periodic timer.
    pub check_interval: Option<Duration>,
    pub timeout: Duration,
    pub log_gap_again_after: chrono::Duration,
}

/// What a rate check did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RateAction {
    /// No usable ticker price.
    Skipped,
    WithinThreshold,
    Updated { outcome: TxOutcome },
}

#[derive(Debug, Clone, Serialize)]
pub struct RateCheckResult {
    pub checked_at: DateTime<Utc>,
    pub symbol: String,
    pub decimals: u32,
    pub current_rate: StoredRate,
    pub live_price: Option<Decimal>,
    pub live_price_difference: Option<Decimal>,
    pub tickers: Vec<TickerStatus>,
    #[serde(flatten)]
    pub action: RateAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatesStatus {
    pub initialised: bool,
    pub rates_address: Address,
    pub symbol: String,
    pub busy: bool,
    pub run_count: u64,
    pub last_check: Option<RateCheckResult>,
    pub last_result: Option<RunRecord>,
}

/// Relative deviation `|live - current| / current`. `None` when no rate is
/// stored yet.
#[must_use]
pub fn price_difference(current: Decimal, live: Decimal) -> Option<Decimal> {
    if current.is_zero() {
        return None;
    }
    Some(((live - current) / current).abs())
}

/// Whether a deviation warrants an update. A missing stored rate always does.
#[must_use]
pub fn exceeds_threshold(difference: Option<Decimal>, threshold_pct: Decimal) -> bool {
    difference.map_or(true, |d| d * Decimal::ONE_HUNDRED > threshold_pct)
}

struct RatesJob {
    connection: LedgerConnection,
    pipeline: Arc<TransactionPipeline>,
    tickers: Vec<Arc<dyn TickerFeed>>,
    settings: RateSettings,
    gap_throttle: Mutex<LogThrottle>,
    last_check: RwLock<Option<RateCheckResult>>,
}

impl RatesJob {
    async fn decimals(&self) -> Result<u32> {
        match self.settings.token {
            Some(token) => Ok(rates::token_decimals(&self.connection, token).await?),
            None => Ok(self.settings.decimals),
        }
    }

    async fn check_ticker_price(&self) -> Result<()> {
        let settings = &self.settings;
        let decimals = self.decimals().await?;
        let current_rate =
            rates::fetch_rate(&self.connection, settings.rates, &settings.symbol, decimals).await?;

        let samples: Vec<_> = self.tickers.iter().map(|t| t.latest()).collect();
        let tickers: Vec<TickerStatus> = self.tickers.iter().map(|t| t.status()).collect();
        let live_price = median_price(samples.iter().map(Option::as_ref));

        let mut result = RateCheckResult {
            checked_at: Utc::now(),
            symbol: settings.symbol.clone(),
            decimals,
            current_rate,
            live_price,
            live_price_difference: None,
            tickers,
            action: RateAction::Skipped,
        };

        let Some(live) = live_price else {
            if self.gap_throttle.lock().should_log(NO_LIVE_PRICE, result.checked_at) {
                warn!(
                    symbol = %settings.symbol,
                    tickers = self.tickers.len(),
                    "No live price from any ticker, skipping rate check"
                );
            }
            *self.last_check.write() = Some(result);
            return Ok(());
        };

        {
            let mut throttle = self.gap_throttle.lock();
            if throttle.is_active() {
                info!(symbol = %settings.symbol, live_price = %live, "Live price available again");
                throttle.reset();
            }
        }

        let difference = price_difference(result.current_rate.rate, live);
        result.live_price_difference = difference;

        if !exceeds_threshold(difference, settings.threshold_pct) {
            debug!(
                symbol = %settings.symbol,
                current = %result.current_rate.rate,
                live = %live,
                difference = ?difference,
                "Rate within threshold"
            );
            result.action = RateAction::WithinThreshold;
            *self.last_check.write() = Some(result);
            return Ok(());
        }

        info!(
            symbol = %settings.symbol,
            current = %result.current_rate.rate,
            live = %live,
            difference = ?difference,
            threshold_pct = %settings.threshold_pct,
            "Updating on-chain rate"
        );
        let payload = rates::set_rate_payload(
            settings.rates,
            &settings.symbol,
            live,
            decimals,
            settings.set_rate_gas_limit,
        )?;
        let outcome = self.pipeline.submit(payload).await;
        let failed = outcome.is_failed().then(|| outcome.to_string());
        result.action = RateAction::Updated { outcome };
        *self.last_check.write() = Some(result);

        match failed {
            Some(outcome) => Err(TxError::Unsuccessful {
                label: rates::SET_RATE_LABEL,
                outcome,
            }
            .into()),
            None => Ok(()),
        }
    }
}

pub struct RateScheduler {
    job: Arc<RatesJob>,
    guard: Arc<SingleFlight>,
    /// Last session generation a connect-triggered check ran for.
    handled_session: AtomicU64,
    initialised: AtomicBool,
}

impl RateScheduler {
    #[must_use]
    pub fn new(
        connection: LedgerConnection,
        pipeline: Arc<TransactionPipeline>,
        tickers: Vec<Arc<dyn TickerFeed>>,
        settings: RateSettings,
    ) -> Arc<Self> {
        let timeout = settings.timeout;
        let job = Arc::new(RatesJob {
            connection,
            pipeline,
            tickers,
            gap_throttle: Mutex::new(LogThrottle::new(settings.log_gap_again_after)),
            settings,
            last_check: RwLock::new(None),
        });

        let runner = Arc::clone(&job);
        let work: Job = Arc::new(move || {
            let job = Arc::clone(&runner);
            Box::pin(async move { job.check_ticker_price().await })
        });

        Arc::new(Self {
            job,
            guard: SingleFlight::new("rates", timeout, work),
            handled_session: AtomicU64::new(0),
            initialised: AtomicBool::new(false),
        })
    }

    /// Request a rate check.
    pub fn trigger(&self) -> Trigger {
        self.guard.trigger()
    }

    /// Wait until no check is active or scheduled.
    pub async fn wait_idle(&self) {
        self.guard.wait_idle().await;
    }

    #[must_use]
    pub fn status(&self) -> RatesStatus {
        RatesStatus {
            initialised: self.initialised.load(Ordering::SeqCst),
            rates_address: self.job.settings.rates,
            symbol: self.job.settings.symbol.clone(),
            busy: self.guard.is_busy(),
            run_count: self.guard.run_count(),
            last_check: self.job.last_check.read().clone(),
            last_result: self.guard.last_run(),
        }
    }

    /// Start the check timer and connection listener until `shutdown` flips
    /// to `true`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut events = self.job.connection.events();
        let mut timer = self.job.settings.check_interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        self.initialised.store(true, Ordering::SeqCst);
        info!(
            rates = %self.job.settings.rates,
            symbol = %self.job.settings.symbol,
            check_interval_ms = self.job.settings.check_interval.map(|d| d.as_millis() as u64),
            threshold_pct = %self.job.settings.threshold_pct,
            "Rates feeder started"
        );

        tokio::spawn(async move {
            if self.job.connection.state() == ConnectionState::Connected {
                self.on_connected();
            }

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = next_tick(timer.as_mut()) => {
                        if self.job.connection.state() == ConnectionState::Connected {
                            self.guard.trigger();
                        } else {
                            debug!("Not connected, skipping scheduled rate check");
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(ConnectionEvent::Connected) => self.on_connected(),
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Rates feeder lagged behind connection events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            info!("Rates feeder stopped");
        })
    }

    /// Trigger a check once per connection session.
    fn on_connected(&self) {
        let session = self.job.connection.session_generation();
        if self.handled_session.swap(session, Ordering::SeqCst) == session {
            debug!(session, "Session already checked");
            return;
        }
        self.guard.trigger();
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
