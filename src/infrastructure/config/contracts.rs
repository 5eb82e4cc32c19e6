//! Deployed contract addresses and token parameters.

use alloy_primitives::Address;
use serde::Deserialize;

/// Contracts the keeper operates on.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    /// Exchange contract. Required when matching is enabled.
    #[serde(default)]
    pub exchange: Option<Address>,
    /// Rates oracle contract. Required by both jobs.
    #[serde(default)]
    pub rates: Option<Address>,
    /// Token contract. When set, its `decimals()` is read before every rate
    /// check and `token_decimals` is ignored.
    #[serde(default)]
    pub token: Option<Address>,
    /// Fiat currency symbol the oracle is fed for.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Decimals of the token; rates are stored scaled by `10^decimals`.
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Orders fetched per `getActive*Orders` call.
    #[serde(default = "default_order_chunk_size")]
    pub order_chunk_size: u16,
}

fn default_symbol() -> String {
    "EUR".into()
}

fn default_token_decimals() -> u32 {
    2
}

fn default_order_chunk_size() -> u16 {
    100
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            exchange: None,
            rates: None,
            token: None,
            symbol: default_symbol(),
            token_decimals: default_token_decimals(),
            order_chunk_size: default_order_chunk_size(),
        }
    }
}
