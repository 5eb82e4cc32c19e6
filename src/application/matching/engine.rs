//! Order matching over a snapshot order book.
//!
//! Pure computation: callers pass priority-sorted order lists, the published
//! conversion rate and a gas budget, and get back the pairs that fit in one
//! `matchMultipleOrders` transaction. The inputs are never mutated; remaining
//! amounts are tracked on a working copy.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::{MatchBatch, Order, PPM_DIV};

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

/// Gas charged per matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCosts {
    pub first_match: u64,
    pub additional_match: u64,
}

impl Default for GasCosts {
    fn default() -> Self {
        Self {
            first_match: 200_000,
            additional_match: 140_000,
        }
    }
}

struct Working {
    order: Order,
    remaining: U256,
}

impl Working {
    fn new(order: &Order) -> Self {
        Self {
            order: order.clone(),
            remaining: order.amount,
        }
    }
}

/// Compute the maximal batch of matches that fits `gas_budget`.
///
/// `buy_orders` must be sorted by price descending then id ascending,
/// `sell_orders` by price ascending then id ascending (see
/// [`OrderBookSnapshot::new`](crate::domain::OrderBookSnapshot::new)).
/// `conversion_rate` is token base units per 1 ETH; zero yields an empty
/// batch.
#[must_use]
pub fn match_order_book(
    buy_orders: &[Order],
    sell_orders: &[Order],
    conversion_rate: U256,
    gas_budget: u64,
    costs: GasCosts,
) -> MatchBatch {
    let mut batch = MatchBatch::empty();

    let (Some(best_buy), Some(best_sell)) = (buy_orders.first(), sell_orders.first()) else {
        return batch;
    };
    if conversion_rate.is_zero() {
        return batch;
    }

    let lowest_sell_price = best_sell.price;
    let highest_buy_price = best_buy.price;

    let mut buys: Vec<Working> = buy_orders
        .iter()
        .filter(|o| o.price >= lowest_sell_price)
        .map(Working::new)
        .collect();
    let mut sells: Vec<Working> = sell_orders
        .iter()
        .filter(|o| o.price <= highest_buy_price)
        .map(Working::new)
        .collect();

    let wei_per_eth = U256::from(WEI_PER_ETH);
    let rate_ppm = conversion_rate.saturating_mul(U256::from(PPM_DIV));

    let mut buy_idx = 0;
    let mut sell_idx = 0;
    let mut next_gas = costs.first_match;

    while buy_idx < buys.len() && sell_idx < sells.len() && next_gas <= gas_budget {
        let buy = &mut buys[buy_idx];
        let sell = &mut sells[sell_idx];

        // Earlier order sets the price.
        let price = if buy.order.id > sell.order.id {
            sell.order.price
        } else {
            buy.order.price
        };
        let price_wei = U256::from(price).saturating_mul(wei_per_eth);

        let sell_wei = sell
            .remaining
            .saturating_mul(price_wei)
            .checked_div(rate_ppm)
            .unwrap_or(U256::MAX);
        let buy_tokens = buy
            .remaining
            .saturating_mul(rate_ppm)
            .checked_div(price_wei)
            .unwrap_or(U256::MAX);

        let (traded_wei, traded_tokens) = if sell.remaining < buy_tokens {
            (sell_wei, sell.remaining)
        } else {
            (buy.remaining, buy_tokens)
        };

        trace!(
            buy_id = %buy.order.id,
            sell_id = %sell.order.id,
            price,
            traded_wei = %traded_wei,
            traded_tokens = %traded_tokens,
            "Matched pair"
        );
        batch.push(buy.order.id, sell.order.id, next_gas);

        buy.remaining = buy.remaining.saturating_sub(traded_wei);
        sell.remaining = sell.remaining.saturating_sub(traded_tokens);

        // The fully executed side always reaches zero, so every pass advances.
        if buy.remaining.is_zero() {
            buy_idx += 1;
        }
        if sell.remaining.is_zero() {
            sell_idx += 1;
        }

        next_gas = next_gas.saturating_add(costs.additional_match);
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use proptest::prelude::*;

    use crate::domain::{Direction, OrderBookSnapshot, OrderId};

    const ETH: u64 = 1_000_000_000_000_000_000;
    /// Token base units per 1 ETH.
    const RATE: u64 = 4_000_000;

    fn buy(id: u64, price: u32, wei: u64) -> Order {
        Order::new(id, Address::ZERO, Direction::Buy, price, U256::from(wei))
    }

    fn sell(id: u64, price: u32, tokens: u64) -> Order {
        Order::new(id, Address::ZERO, Direction::Sell, price, U256::from(tokens))
    }

    fn run(buys: Vec<Order>, sells: Vec<Order>, budget: u64) -> MatchBatch {
        let book = OrderBookSnapshot::new(buys, sells);
        match_order_book(
            &book.buy_orders,
            &book.sell_orders,
            U256::from(RATE),
            budget,
            GasCosts::default(),
        )
    }

    fn ids(ids: &[OrderId]) -> Vec<u64> {
        ids.iter().map(|id| id.value()).collect()
    }

    #[test]
    fn empty_sides_give_empty_batch() {
        let batch = run(vec![], vec![sell(1, 1_000_000, 100)], 10_000_000);
        assert!(batch.is_empty());
        assert_eq!(batch.gas_estimate(), 0);

        let batch = run(vec![buy(1, 1_000_000, ETH)], vec![], 10_000_000);
        assert!(batch.is_empty());
    }

    #[test]
    fn zero_rate_gives_empty_batch() {
        let book = OrderBookSnapshot::new(vec![buy(1, 1_000_000, ETH)], vec![sell(2, 1_000_000, 100)]);
        let batch = match_order_book(
            &book.buy_orders,
            &book.sell_orders,
            U256::ZERO,
            10_000_000,
            GasCosts::default(),
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn non_crossing_book_gives_empty_batch() {
        let batch = run(vec![buy(1, 990_000, ETH)], vec![sell(2, 1_000_000, 100)], 10_000_000);
        assert!(batch.is_empty());
    }

    #[test]
    fn smaller_sell_fills_and_buy_continues() {
        // Buy of 1 ETH is worth 4_000_000 token units; two sells of 1_000_000
        // each fill entirely against it.
        let batch = run(
            vec![buy(1, 1_000_000, ETH)],
            vec![sell(2, 1_000_000, 1_000_000), sell(3, 1_000_000, 1_000_000)],
            10_000_000,
        );
        assert_eq!(ids(batch.buy_ids()), vec![1, 1]);
        assert_eq!(ids(batch.sell_ids()), vec![2, 3]);
        assert_eq!(batch.gas_estimate(), 340_000);
    }

    #[test]
    fn larger_sell_absorbs_several_buys() {
        let batch = run(
            vec![buy(1, 1_000_000, ETH / 2), buy(2, 1_000_000, ETH / 2)],
            vec![sell(3, 1_000_000, 10_000_000)],
            10_000_000,
        );
        assert_eq!(ids(batch.buy_ids()), vec![1, 2]);
        assert_eq!(ids(batch.sell_ids()), vec![3, 3]);
    }

    #[test]
    fn exact_fill_advances_both_sides() {
        let batch = run(
            vec![buy(1, 1_000_000, ETH), buy(3, 1_000_000, ETH)],
            vec![sell(2, 1_000_000, 4_000_000), sell(4, 1_000_000, 4_000_000)],
            10_000_000,
        );
        assert_eq!(ids(batch.buy_ids()), vec![1, 3]);
        assert_eq!(ids(batch.sell_ids()), vec![2, 4]);
    }

    #[test]
    fn orders_outside_best_prices_are_ignored() {
        let batch = run(
            vec![buy(1, 1_020_000, ETH), buy(2, 980_000, ETH)],
            vec![sell(3, 1_000_000, 1_000_000), sell(4, 1_030_000, 1_000_000)],
            10_000_000,
        );
        assert!(!ids(batch.buy_ids()).contains(&2));
        assert!(!ids(batch.sell_ids()).contains(&4));
        assert_eq!(ids(batch.sell_ids()), vec![3]);
    }

    #[test]
    fn earlier_buy_sets_price() {
        // At the buy's 1.02 the 1 ETH buy is worth 3_921_568 units, less than
        // the 3_950_000 on offer, so the buy fills and the sell stays open.
        let batch = run(
            vec![buy(1, 1_020_000, ETH)],
            vec![sell(2, 1_000_000, 3_950_000), sell(3, 1_000_000, 1_000_000)],
            10_000_000,
        );
        assert_eq!(ids(batch.buy_ids()), vec![1]);
        assert_eq!(ids(batch.sell_ids()), vec![2]);
    }

    #[test]
    fn earlier_sell_sets_price() {
        // At the sell's 1.00 the same buy is worth 4_000_000 units, so the
        // first sell fills and the rest of the buy moves on to the next one.
        let batch = run(
            vec![buy(3, 1_020_000, ETH)],
            vec![sell(1, 1_000_000, 3_950_000), sell(2, 1_000_000, 1_000_000)],
            10_000_000,
        );
        assert_eq!(ids(batch.buy_ids()), vec![3, 3]);
        assert_eq!(ids(batch.sell_ids()), vec![1, 2]);
    }

    #[test]
    fn gas_budget_limits_batch() {
        let sells: Vec<Order> = (10..20).map(|id| sell(id, 1_000_000, 100)).collect();
        let batch = run(vec![buy(1, 1_000_000, 10 * ETH)], sells, 500_000);

        // 200k, 340k and 480k fit; 620k does not.
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.gas_estimate(), 480_000);
    }

    #[test]
    fn budget_below_first_match_gives_empty_batch() {
        let batch = run(vec![buy(1, 1_000_000, ETH)], vec![sell(2, 1_000_000, 100)], 199_999);
        assert!(batch.is_empty());
        assert_eq!(batch.gas_estimate(), 0);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let book = OrderBookSnapshot::new(vec![buy(1, 1_000_000, ETH)], vec![sell(2, 1_000_000, 100)]);
        let before = book.clone();
        let _ = match_order_book(
            &book.buy_orders,
            &book.sell_orders,
            U256::from(RATE),
            10_000_000,
            GasCosts::default(),
        );
        assert_eq!(book, before);
    }

    fn order_strategy(direction: Direction) -> impl Strategy<Value = Order> {
        (1u64..500, 900_000u32..1_100_000, 1u64..10 * ETH)
            .prop_map(move |(id, price, amount)| {
                let amount = match direction {
                    Direction::Buy => amount,
                    Direction::Sell => amount / 1_000_000_000_000,
                };
                Order::new(id, Address::ZERO, direction, price, U256::from(amount.max(1)))
            })
    }

    fn unique_ids(mut orders: Vec<Order>, offset: u64) -> Vec<Order> {
        for (i, order) in orders.iter_mut().enumerate() {
            order.id = OrderId::new(offset + i as u64);
        }
        orders
    }

    proptest! {
        #[test]
        fn batch_respects_budget_and_inputs(
            buys in prop::collection::vec(order_strategy(Direction::Buy), 0..20),
            sells in prop::collection::vec(order_strategy(Direction::Sell), 0..20),
            rate in 1u64..100_000_000,
            budget in 0u64..5_000_000,
        ) {
            let book = OrderBookSnapshot::new(unique_ids(buys, 1), unique_ids(sells, 1_000));
            let costs = GasCosts::default();
            let batch = match_order_book(&book.buy_orders, &book.sell_orders, U256::from(rate), budget, costs);

            prop_assert!(batch.gas_estimate() <= budget);
            prop_assert_eq!(batch.buy_ids().len(), batch.sell_ids().len());
            if batch.is_empty() {
                prop_assert_eq!(batch.gas_estimate(), 0);
            } else {
                let expected = costs.first_match + costs.additional_match * (batch.len() as u64 - 1);
                prop_assert_eq!(batch.gas_estimate(), expected);
            }

            for (buy_id, sell_id) in batch.pairs() {
                prop_assert!(book.buy_orders.iter().any(|o| o.id == buy_id));
                prop_assert!(book.sell_orders.iter().any(|o| o.id == sell_id));
            }

            let again = match_order_book(&book.buy_orders, &book.sell_orders, U256::from(rate), budget, costs);
            prop_assert_eq!(batch, again);
        }
    }
}
