//! Match making job.
//!
//! Reacts to connection events and on-chain order events:
//!
//! - `Connected`: subscribe to the Exchange's `NewOrder`/`OrderFill` logs on
//!   the new session, then trigger a run.
//! - `ConnectionLost` / `Disconnected`: drop the subscription. The session it
//!   belonged to is gone.
//! - `NewOrder` log: trigger a run. `OrderFill` logs are only logged.
//!
//! A run reads the conversion rate, fetches the order book, computes the
//! batch against the safe block gas limit and submits it if non-empty. Runs
//! go through a [`SingleFlight`] guard.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{match_order_book, GasCosts};
use crate::adapter::outbound::contracts::{exchange, rates};
use crate::adapter::outbound::contracts::exchange::OrderEvent;
use crate::application::guard::{Job, RunRecord, SingleFlight, Trigger};
use crate::application::transaction::TransactionPipeline;
use crate::domain::{ConnectionEvent, ConnectionState, TxOutcome};
use crate::error::{LedgerError, Result, TxError};
use crate::infrastructure::ledger::LedgerConnection;

/// Static inputs of the matching job.
#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub exchange: Address,
    pub rates: Address,
    pub symbol: String,
    pub order_chunk_size: u16,
    pub gas_costs: GasCosts,
    pub timeout: Duration,
}

/// Summary of the last completed matching cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MatchingRun {
    pub started_at: DateTime<Utc>,
    pub conversion_rate: U256,
    pub gas_budget: u64,
    pub buy_orders: usize,
    pub sell_orders: usize,
    pub matches: usize,
    pub gas_estimate: u64,
    pub outcome: Option<TxOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchingStatus {
    pub initialised: bool,
    pub exchange_address: Address,
    pub rates_address: Address,
    pub busy: bool,
    pub run_count: u64,
    pub last_run: Option<MatchingRun>,
    pub last_result: Option<RunRecord>,
}

struct MatchingJob {
    connection: LedgerConnection,
    pipeline: Arc<TransactionPipeline>,
    settings: MatchingSettings,
    last_run: RwLock<Option<MatchingRun>>,
}

impl MatchingJob {
    async fn run(&self) -> Result<()> {
        let started_at = Utc::now();
        let gas_budget = self
            .connection
            .safe_block_gas_limit()
            .ok_or(LedgerError::NotConnected)?;

        let conversion_rate =
            rates::conversion_rate(&self.connection, self.settings.rates, &self.settings.symbol).await?;
        let book = exchange::fetch_order_book(
            &self.connection,
            self.settings.exchange,
            self.settings.order_chunk_size,
        )
        .await?;

        let batch = match_order_book(
            &book.buy_orders,
            &book.sell_orders,
            conversion_rate,
            gas_budget,
            self.settings.gas_costs,
        );

        let mut run = MatchingRun {
            started_at,
            conversion_rate,
            gas_budget,
            buy_orders: book.buy_orders.len(),
            sell_orders: book.sell_orders.len(),
            matches: batch.len(),
            gas_estimate: batch.gas_estimate(),
            outcome: None,
        };

        let Some(payload) = exchange::match_multiple_orders_payload(self.settings.exchange, &batch)
        else {
            debug!(
                buy_orders = run.buy_orders,
                sell_orders = run.sell_orders,
                "No matching orders"
            );
            *self.last_run.write() = Some(run);
            return Ok(());
        };

        info!(
            matches = batch.len(),
            gas_estimate = batch.gas_estimate(),
            gas_budget,
            "Submitting order matches"
        );
        let outcome = self.pipeline.submit(payload).await;
        run.outcome = Some(outcome.clone());
        *self.last_run.write() = Some(run);

        if outcome.is_failed() {
            return Err(TxError::Unsuccessful {
                label: exchange::MATCH_LABEL,
                outcome: outcome.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

struct OrderSubscription {
    id: String,
    /// Connection session generation the subscription was opened on.
    session: u64,
    forwarder: JoinHandle<()>,
}

pub struct MatchingScheduler {
    job: Arc<MatchingJob>,
    guard: Arc<SingleFlight>,
    subscription: Mutex<Option<OrderSubscription>>,
    /// Last session generation `on_connected` ran for.
    handled_session: AtomicU64,
    initialised: AtomicBool,
}

impl MatchingScheduler {
    #[must_use]
    pub fn new(
        connection: LedgerConnection,
        pipeline: Arc<TransactionPipeline>,
        settings: MatchingSettings,
    ) -> Arc<Self> {
        let timeout = settings.timeout;
        let job = Arc::new(MatchingJob {
            connection,
            pipeline,
            settings,
            last_run: RwLock::new(None),
        });

        let runner = Arc::clone(&job);
        let work: Job = Arc::new(move || {
            let job = Arc::clone(&runner);
            Box::pin(async move { job.run().await })
        });

        Arc::new(Self {
            job,
            guard: SingleFlight::new("matching", timeout, work),
            subscription: Mutex::new(None),
            handled_session: AtomicU64::new(0),
            initialised: AtomicBool::new(false),
        })
    }

    /// Request a matching run.
    pub fn trigger(&self) -> Trigger {
        self.guard.trigger()
    }

    /// Wait until no run is active or scheduled.
    pub async fn wait_idle(&self) {
        self.guard.wait_idle().await;
    }

    #[must_use]
    pub fn status(&self) -> MatchingStatus {
        MatchingStatus {
            initialised: self.initialised.load(Ordering::SeqCst),
            exchange_address: self.job.settings.exchange,
            rates_address: self.job.settings.rates,
            busy: self.guard.is_busy(),
            run_count: self.guard.run_count(),
            last_run: self.job.last_run.read().clone(),
            last_result: self.guard.last_run(),
        }
    }

    /// Start reacting to connection events until `shutdown` flips to `true`.
    ///
    /// Subscribe before connecting so the first `Connected` is seen. If the
    /// connection is already up, a run is triggered immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut events = self.job.connection.events();
        self.initialised.store(true, Ordering::SeqCst);
        info!(
            exchange = %self.job.settings.exchange,
            rates = %self.job.settings.rates,
            "Match maker started"
        );

        tokio::spawn(async move {
            if self.job.connection.state() == ConnectionState::Connected {
                self.on_connected().await;
            }

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(ConnectionEvent::Connected) => self.on_connected().await,
                            Ok(ConnectionEvent::ConnectionLost { reason }) => {
                                debug!(reason = %reason, "Dropping order subscription");
                                self.drop_subscription();
                            }
                            Ok(ConnectionEvent::Disconnected) => {
                                self.drop_subscription();
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Match maker lagged behind connection events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            self.shutdown().await;
            info!("Match maker stopped");
        })
    }

    /// Subscribe to order events on the current session and trigger a run.
    /// Runs at most once per session: the startup state check and the queued
    /// `Connected` event for the same session collapse into one.
    async fn on_connected(&self) {
        let connection = &self.job.connection;
        let session = connection.session_generation();
        if self.handled_session.swap(session, Ordering::SeqCst) == session {
            debug!(session, "Session already handled");
            return;
        }

        if let Some(stale) = self.drop_subscription() {
            if stale.session == session {
                connection.unsubscribe(&stale.id).await;
            }
        }

        match connection
            .subscribe_logs(self.job.settings.exchange, &exchange::order_event_topics())
            .await
        {
            Ok(subscription) if connection.session_generation() != session => {
                // Reconnected mid-subscribe; the next `Connected` resubscribes.
                connection.unsubscribe(&subscription.id).await;
                return;
            }
            Ok(subscription) => {
                debug!(subscription = %subscription.id, session, "Subscribed to order events");
                let guard = Arc::clone(&self.guard);
                let mut notifications = subscription.notifications;
                let forwarder = tokio::spawn(async move {
                    while let Some(log) = notifications.recv().await {
                        on_order_event(&guard, log);
                    }
                });
                *self.subscription.lock() = Some(OrderSubscription {
                    id: subscription.id,
                    session,
                    forwarder,
                });
            }
            Err(e) => warn!(error = %e, "Order event subscription failed"),
        }

        self.guard.trigger();
    }

    fn drop_subscription(&self) -> Option<OrderSubscription> {
        let subscription = self.subscription.lock().take()?;
        subscription.forwarder.abort();
        Some(subscription)
    }

    async fn shutdown(&self) {
        if let Some(subscription) = self.drop_subscription() {
            if self.job.connection.state() == ConnectionState::Connected {
                self.job.connection.unsubscribe(&subscription.id).await;
            }
        }
    }
}

fn on_order_event(guard: &Arc<SingleFlight>, log: serde_json::Value) {
    match exchange::decode_order_event(log) {
        Ok(OrderEvent::NewOrder {
            order_id,
            maker,
            price,
            token_amount,
            wei_amount,
        }) => {
            info!(
                order_id = %order_id,
                maker = %maker,
                price,
                token_amount = %token_amount,
                wei_amount = %wei_amount,
                "New order"
            );
            guard.trigger();
        }
        Ok(OrderEvent::OrderFill {
            buy_order_id,
            sell_order_id,
            price,
            wei_amount,
            token_amount,
        }) => info!(
            buy_order_id = %buy_order_id,
            sell_order_id = %sell_order_id,
            price,
            wei_amount = %wei_amount,
            token_amount = %token_amount,
            "Order filled"
        ),
        Err(e) => warn!(error = %e, "Undecodable order event"),
    }
}
