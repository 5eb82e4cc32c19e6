//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use crate::infrastructure::config::{LedgerConfig, TransactionConfig};

/// Connection config with no liveness poll and a short reconnect delay.
pub fn ledger() -> LedgerConfig {
    LedgerConfig {
        url: "ws://scripted".to_string(),
        connection_check_interval_ms: 0,
        reconnect_delay_ms: 50,
        ..LedgerConfig::default()
    }
}

/// Transaction tracking that confirms after one block and polls fast.
pub fn transactions() -> TransactionConfig {
    TransactionConfig {
        success_confirmations: 1,
        timeout_secs: 30,
        poll_interval_ms: 10,
    }
}

/// Test signing key. Never funded anywhere.
pub const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
