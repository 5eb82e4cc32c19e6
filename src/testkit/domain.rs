//! Builders for domain primitives used across tests.

use alloy_primitives::{Address, U256};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{Direction, Order, TickerSample};

/// One ETH in wei.
pub const ETH: u64 = 1_000_000_000_000_000_000;

/// Maker address derived from the order id, so rows round-trip distinctly.
pub fn maker(id: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&id.to_be_bytes());
    Address::from(bytes)
}

/// Buy order for `wei` at `price` (parts per million).
pub fn buy_order(id: u64, price: u32, wei: u64) -> Order {
    Order::new(id, maker(id), Direction::Buy, price, U256::from(wei))
}

/// Sell order for `tokens` base units at `price` (parts per million).
pub fn sell_order(id: u64, price: u32, tokens: u64) -> Order {
    Order::new(id, maker(id), Direction::Sell, price, U256::from(tokens))
}

/// Sample observed now.
pub fn sample(price: Option<Decimal>) -> TickerSample {
    TickerSample::new(price, Utc::now())
}
