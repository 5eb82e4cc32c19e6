//! Handler for the `check` command.

use std::path::Path;

use alloy_primitives::Address;

use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::config::{Config, MATCHMAKER_KEY_VAR, RATESFEEDER_KEY_VAR};

/// What `check` found in a valid configuration.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub node: String,
    pub symbol: String,
    pub exchange: Option<Address>,
    pub rates: Option<Address>,
    pub matching_enabled: bool,
    pub rates_enabled: bool,
    pub tickers: Vec<String>,
    pub matchmaker: KeyStatus,
    pub ratesfeeder: KeyStatus,
}

/// State of one signing key. Only the derived address is ever shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Missing,
    Invalid(String),
    Present(Address),
}

impl CheckReport {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let key_status = |signer: Result<alloy_signer_local::PrivateKeySigner>, key: &Option<String>| {
            match (signer, key) {
                (_, None) => KeyStatus::Missing,
                (Ok(signer), Some(_)) => KeyStatus::Present(signer.address()),
                (Err(e), Some(_)) => KeyStatus::Invalid(e.to_string()),
            }
        };

        Self {
            node: config.ledger.url.clone(),
            symbol: config.contracts.symbol.clone(),
            exchange: config.exchange_address(),
            rates: config.rates_address(),
            matching_enabled: config.matching.enabled,
            rates_enabled: config.rates.enabled,
            tickers: config
                .tickers
                .iter()
                .map(|t| t.provider.name().to_string())
                .collect(),
            matchmaker: key_status(config.matchmaker_signer(), &config.keys.matchmaker),
            ratesfeeder: key_status(config.ratesfeeder_signer(), &config.keys.ratesfeeder),
        }
    }

    /// Whether every enabled job has a usable key.
    #[must_use]
    pub fn ready(&self) -> bool {
        let usable = |status: &KeyStatus| matches!(status, KeyStatus::Present(_));
        (!self.matching_enabled || usable(&self.matchmaker))
            && (!self.rates_enabled || usable(&self.ratesfeeder))
    }
}

/// Validate the configuration file without connecting anywhere.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let report = CheckReport::from_config(&config);

    output::section("Configuration Check");
    output::field("Config", config_path.display());
    output::success("Configuration file is valid");

    output::section("Summary");
    output::field("Node", &report.node);
    output::field("Symbol", &report.symbol);
    output::field("Exchange", display_address(report.exchange));
    output::field("Rates", display_address(report.rates));
    output::field("Matching", enabled_label(report.matching_enabled));
    output::field("Rate feeding", enabled_label(report.rates_enabled));
    if report.rates_enabled {
        output::field("Tickers", report.tickers.join(", "));
    }

    output::section("Signing keys");
    if report.matching_enabled {
        print_key(MATCHMAKER_KEY_VAR, &report.matchmaker);
    }
    if report.rates_enabled {
        print_key(RATESFEEDER_KEY_VAR, &report.ratesfeeder);
    }

    if report.ready() {
        output::success("Configuration check complete");
    } else {
        output::warning("Configuration is valid but `run` will fail until the keys above are set");
    }

    Ok(())
}

fn print_key(var: &str, status: &KeyStatus) {
    match status {
        KeyStatus::Present(address) => output::success(&format!("{var} set (account {address})")),
        KeyStatus::Missing => output::warning(&format!("{var} is not set")),
        KeyStatus::Invalid(reason) => output::warning(&format!("{var} is invalid: {reason}")),
    }
}

fn display_address(address: Option<Address>) -> String {
    address.map_or_else(|| "not configured".to_string(), |a| a.to_string())
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
