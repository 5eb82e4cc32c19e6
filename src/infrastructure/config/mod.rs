//! Configuration loading and validation.
//!
//! One TOML file, split into sections, with secrets taken from the
//! environment only. [`Config`] is the root.

pub mod contracts;
pub mod jobs;
pub mod ledger;
pub mod logging;
pub mod settings;
pub mod status;
pub mod ticker;

pub use contracts::ContractsConfig;
pub use jobs::{MatchingConfig, RatesConfig};
pub use ledger::{LedgerConfig, TransactionConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use settings::{Config, SigningKeys, MATCHMAKER_KEY_VAR, RATESFEEDER_KEY_VAR};
pub use status::StatusConfig;
pub use ticker::{default_tickers, TickerConfig};
