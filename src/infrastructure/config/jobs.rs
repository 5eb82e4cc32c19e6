//! Background job configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Order matching job.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Upper bound on one matching run, including confirmation tracking.
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
    /// Gas estimate of the first pair in a batch.
    #[serde(default = "default_first_match_gas")]
    pub first_match_gas: u64,
    /// Gas estimate of each further pair.
    #[serde(default = "default_additional_match_gas")]
    pub additional_match_gas: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_job_timeout_secs() -> u64 {
    900
}

fn default_first_match_gas() -> u64 {
    200_000
}

fn default_additional_match_gas() -> u64 {
    140_000
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_secs: default_job_timeout_secs(),
            first_match_gas: default_first_match_gas(),
            additional_match_gas: default_additional_match_gas(),
        }
    }
}

impl MatchingConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rate feeding job.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Periodic check interval (milliseconds). 0 disables the timer.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Minimum deviation, in percent, that triggers an update.
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: Decimal,
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_set_rate_gas_limit")]
    pub set_rate_gas_limit: u64,
    /// Minutes before a repeated "no live price" warning is logged again.
    #[serde(default = "default_log_gap_again_after_mins")]
    pub log_gap_again_after_mins: i64,
}

fn default_check_interval_ms() -> u64 {
    300_000
}

fn default_threshold_pct() -> Decimal {
    Decimal::ONE
}

fn default_set_rate_gas_limit() -> u64 {
    80_000
}

fn default_log_gap_again_after_mins() -> i64 {
    120
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            check_interval_ms: default_check_interval_ms(),
            threshold_pct: default_threshold_pct(),
            timeout_secs: default_job_timeout_secs(),
            set_rate_gas_limit: default_set_rate_gas_limit(),
            log_gap_again_after_mins: default_log_gap_again_after_mins(),
        }
    }
}

impl RatesConfig {
    /// `None` when the periodic timer is disabled.
    #[must_use]
    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval_ms > 0).then(|| Duration::from_millis(self.check_interval_ms))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn log_gap_again_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.log_gap_again_after_mins)
    }
}
