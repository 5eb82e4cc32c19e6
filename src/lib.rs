//! Augmint keeper - order matching and exchange-rate oracle feeding.
//!
//! A long-running process that keeps an Augmint-style token exchange healthy:
//!
//! - **Matching** - watches the Exchange contract's order book and settles
//!   crossing buy/sell orders in gas-bounded `matchMultipleOrders` batches.
//! - **Rate feeding** - aggregates ETH/fiat prices from public tickers and
//!   updates the Rates oracle when the stored rate drifts past a threshold.
//!
//! Both jobs share one reconnecting WebSocket connection to the node and run
//! through single-flight guards, so a trigger that arrives mid-run schedules
//! exactly one follow-up run.
//!
//! # Modules
//!
//! - [`domain`] - Ledger-agnostic types: orders, tickers, transactions
//! - [`port`] - Traits for the node transport and ticker feeds
//! - [`adapter`] - WebSocket JSON-RPC, contract bindings, HTTP tickers, CLI
//! - [`application`] - Matching engine, schedulers, transaction pipeline
//! - [`infrastructure`] - Configuration, connection lifecycle, orchestration
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use augmint_keeper::infrastructure::config::Config;
//! use augmint_keeper::infrastructure::orchestration;
//!
//! # async fn start() -> augmint_keeper::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! config.init_logging();
//! orchestration::run(config).await
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
