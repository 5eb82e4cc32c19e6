//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all keeper settings.
//! Configuration is loaded from a TOML file; signing keys come only from the
//! environment (`MATCHMAKER_PRIVATE_KEY`, `RATESFEEDER_PRIVATE_KEY`).
//!
//! # Example
//!
//! ```no_run
//! use augmint_keeper::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::contracts::ContractsConfig;
use super::jobs::{MatchingConfig, RatesConfig};
use super::ledger::{LedgerConfig, TransactionConfig};
use super::logging::LoggingConfig;
use super::status::StatusConfig;
use super::ticker::{default_tickers, TickerConfig};
use crate::error::{ConfigError, Result};

pub const MATCHMAKER_KEY_VAR: &str = "MATCHMAKER_PRIVATE_KEY";
pub const RATESFEEDER_KEY_VAR: &str = "RATESFEEDER_PRIVATE_KEY";

/// Highest token decimals a stored rate can be scaled by.
const MAX_TOKEN_DECIMALS: u32 = 18;

/// Signing keys loaded from the environment at runtime (never from the file).
#[derive(Clone, Default)]
pub struct SigningKeys {
    pub matchmaker: Option<String>,
    pub ratesfeeder: Option<String>,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("SigningKeys")
            .field("matchmaker", &redact(&self.matchmaker))
            .field("ratesfeeder", &redact(&self.ratesfeeder))
            .finish()
    }
}

/// Main keeper configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Node connection settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Confirmation tracking for submitted transactions.
    #[serde(default)]
    pub transactions: TransactionConfig,

    #[serde(default)]
    pub contracts: ContractsConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub rates: RatesConfig,

    /// Price feeds aggregated by the rates job. Defaults to Kraken, Bitstamp
    /// and Coinbase.
    #[serde(default = "default_tickers")]
    pub tickers: Vec<TickerConfig>,

    #[serde(default)]
    pub status: StatusConfig,

    /// Time allowed for an orderly shutdown before the process exits with
    /// code 1 (milliseconds).
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,

    #[serde(skip)]
    pub keys: SigningKeys,
}

fn default_exit_timeout_ms() -> u64 {
    10_000
}

fn env_key(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

impl Config {
    /// Parse configuration from TOML content and load signing keys from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        config.keys = SigningKeys {
            matchmaker: env_key(MATCHMAKER_KEY_VAR),
            ratesfeeder: env_key(RATESFEEDER_KEY_VAR),
        };

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Check that required fields are present and values are in range.
    ///
    /// Signing keys are not checked here; see [`Config::matchmaker_signer`]
    /// and [`Config::ratesfeeder_signer`].
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.ledger.url.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "ledger.url" }.into());
        }
        let scheme = self.ledger.url.split("://").next().unwrap_or_default();
        if scheme != "ws" && scheme != "wss" {
            return Err(ConfigError::InvalidValue {
                field: "ledger.url",
                reason: "must be a ws:// or wss:// URL".to_string(),
            }
            .into());
        }
        if self.ledger.connect_timeout_ms == 0
            || self.ledger.is_listening_timeout_ms == 0
            || self.ledger.request_timeout_ms == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "ledger timeouts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.ledger.reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ledger.reconnect_delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.transactions.success_confirmations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transactions.success_confirmations",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.transactions.timeout_secs == 0 || self.transactions.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transactions",
                reason: "timeout and poll interval must be greater than 0".to_string(),
            }
            .into());
        }

        let symbol = &self.contracts.symbol;
        if symbol.is_empty() || symbol.len() > 32 || !symbol.is_ascii() {
            return Err(ConfigError::InvalidValue {
                field: "contracts.symbol",
                reason: "must be 1 to 32 ASCII characters".to_string(),
            }
            .into());
        }
        if self.contracts.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(ConfigError::InvalidValue {
                field: "contracts.token_decimals",
                reason: format!("must be at most {MAX_TOKEN_DECIMALS}"),
            }
            .into());
        }
        if self.contracts.order_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "contracts.order_chunk_size",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.matching.enabled {
            if self.contracts.exchange.is_none() {
                return Err(ConfigError::MissingField {
                    field: "contracts.exchange",
                }
                .into());
            }
            if self.contracts.rates.is_none() {
                return Err(ConfigError::MissingField {
                    field: "contracts.rates",
                }
                .into());
            }
            if self.matching.first_match_gas == 0 || self.matching.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "matching",
                    reason: "first_match_gas and timeout_secs must be greater than 0".to_string(),
                }
                .into());
            }
        }

        if self.rates.enabled {
            if self.contracts.rates.is_none() {
                return Err(ConfigError::MissingField {
                    field: "contracts.rates",
                }
                .into());
            }
            if self.rates.threshold_pct < Decimal::ZERO {
                return Err(ConfigError::InvalidValue {
                    field: "rates.threshold_pct",
                    reason: "must be 0 or greater".to_string(),
                }
                .into());
            }
            if self.rates.set_rate_gas_limit == 0 || self.rates.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "rates",
                    reason: "set_rate_gas_limit and timeout_secs must be greater than 0"
                        .to_string(),
                }
                .into());
            }
            if self.rates.log_gap_again_after_mins < 0 {
                return Err(ConfigError::InvalidValue {
                    field: "rates.log_gap_again_after_mins",
                    reason: "must be 0 or greater".to_string(),
                }
                .into());
            }
            if self.tickers.is_empty() {
                return Err(ConfigError::MissingField { field: "tickers" }.into());
            }
        }

        for ticker in &self.tickers {
            if ticker.fetch_timeout_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "tickers.fetch_timeout_ms",
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
            if let Some(url) = &ticker.url {
                url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                    field: "tickers.url",
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// Signer for settlement transactions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] if `MATCHMAKER_PRIVATE_KEY` is
    /// unset and [`ConfigError::InvalidValue`] if it does not parse.
    #[allow(clippy::result_large_err)]
    pub fn matchmaker_signer(&self) -> Result<PrivateKeySigner> {
        parse_signer(self.keys.matchmaker.as_deref(), MATCHMAKER_KEY_VAR)
    }

    /// Signer for oracle updates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] if `RATESFEEDER_PRIVATE_KEY` is
    /// unset and [`ConfigError::InvalidValue`] if it does not parse.
    #[allow(clippy::result_large_err)]
    pub fn ratesfeeder_signer(&self) -> Result<PrivateKeySigner> {
        parse_signer(self.keys.ratesfeeder.as_deref(), RATESFEEDER_KEY_VAR)
    }

    /// Exchange address; present whenever matching is enabled.
    #[must_use]
    pub fn exchange_address(&self) -> Option<Address> {
        self.contracts.exchange
    }

    /// Rates address; present whenever either job is enabled.
    #[must_use]
    pub fn rates_address(&self) -> Option<Address> {
        self.contracts.rates
    }

    #[must_use]
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[allow(clippy::result_large_err)]
fn parse_signer(key: Option<&str>, field: &'static str) -> Result<PrivateKeySigner> {
    let key = key.ok_or(ConfigError::MissingField { field })?;
    PrivateKeySigner::from_str(key).map_err(|e| {
        ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        }
        .into()
    })
}
