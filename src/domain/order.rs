//! Exchange order book types.
//!
//! Orders are created on-chain and fetched read-only. Buy orders carry their
//! remaining amount in wei, sell orders in token base units. Prices are
//! fixed-point rates in parts per million of the published ETH/fiat rate.

use std::cmp::Ordering;
use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Denominator of order prices (1_000_000 = 100%).
pub const PPM_DIV: u64 = 1_000_000;

/// Exchange order identifier, assigned monotonically by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(u64);

impl OrderId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Order direction as seen from the token side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Buys tokens, pays ETH.
    Buy,
    /// Sells tokens, receives ETH.
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A single resting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub maker: Address,
    pub direction: Direction,
    /// Price in parts per million.
    pub price: u32,
    /// Remaining amount: wei for buys, token base units for sells.
    pub amount: U256,
}

impl Order {
    #[must_use]
    pub fn new(
        id: impl Into<OrderId>,
        maker: Address,
        direction: Direction,
        price: u32,
        amount: U256,
    ) -> Self {
        Self {
            id: id.into(),
            maker,
            direction,
            price,
            amount,
        }
    }

    /// Price priority then time priority.
    ///
    /// Returns `Ordering::Less` when `self` should execute before `other`.
    /// Orders of different directions have no relative priority.
    #[must_use]
    pub fn priority_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.direction != other.direction {
            return None;
        }
        let by_price = match self.direction {
            Direction::Buy => other.price.cmp(&self.price),
            Direction::Sell => self.price.cmp(&other.price),
        };
        Some(by_price.then(self.id.cmp(&other.id)))
    }
}

/// Sort buy orders by price descending, then id ascending.
pub fn sort_buy_orders(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id)));
}

/// Sort sell orders by price ascending, then id ascending.
pub fn sort_sell_orders(orders: &mut [Order]) {
    orders.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
}

/// Full order book fetched for one matching cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBookSnapshot {
    pub buy_orders: Vec<Order>,
    pub sell_orders: Vec<Order>,
}

impl OrderBookSnapshot {
    /// Build a snapshot, sorting both sides into execution priority.
    #[must_use]
    pub fn new(mut buy_orders: Vec<Order>, mut sell_orders: Vec<Order>) -> Self {
        sort_buy_orders(&mut buy_orders);
        sort_sell_orders(&mut sell_orders);
        Self {
            buy_orders,
            sell_orders,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buy_orders.is_empty() && self.sell_orders.is_empty()
    }
}

/// Matched pairs ready for a single `matchMultipleOrders` transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchBatch {
    buy_ids: Vec<OrderId>,
    sell_ids: Vec<OrderId>,
    gas_estimate: u64,
}

impl MatchBatch {
    /// Empty batch with zero gas.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            buy_ids: Vec::new(),
            sell_ids: Vec::new(),
            gas_estimate: 0,
        }
    }

    pub(crate) fn push(&mut self, buy: OrderId, sell: OrderId, gas_estimate: u64) {
        self.buy_ids.push(buy);
        self.sell_ids.push(sell);
        self.gas_estimate = gas_estimate;
    }

    #[must_use]
    pub fn buy_ids(&self) -> &[OrderId] {
        &self.buy_ids
    }

    #[must_use]
    pub fn sell_ids(&self) -> &[OrderId] {
        &self.sell_ids
    }

    /// Pairs in execution order.
    pub fn pairs(&self) -> impl Iterator<Item = (OrderId, OrderId)> + '_ {
        self.buy_ids.iter().copied().zip(self.sell_ids.iter().copied())
    }

    #[must_use]
    pub const fn gas_estimate(&self) -> u64 {
        self.gas_estimate
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buy_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buy_ids.is_empty()
    }
}
