//! Exchange contract: order book reads, batch settlement and order events.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::call::view;
use crate::domain::{Direction, MatchBatch, Order, OrderBookSnapshot, OrderId, TxPayload};
use crate::error::LedgerError;
use crate::port::LedgerRpc;

sol! {
    interface IExchange {
        event NewOrder(uint64 indexed orderId, address indexed maker, uint32 price, uint256 tokenAmount, uint256 weiAmount);
        event OrderFill(address indexed tokenBuyer, address indexed tokenSeller, uint64 buyTokenOrderId, uint64 sellTokenOrderId, uint256 publishedRate, uint32 price, uint256 weiAmount, uint256 tokenAmount);

        function getActiveOrderCounts() external view returns (uint256 buyTokenOrderCount, uint256 sellTokenOrderCount);
        function getActiveBuyOrders(uint256 offset, uint16 chunkSize) external view returns (uint256[4][] response);
        function getActiveSellOrders(uint256 offset, uint16 chunkSize) external view returns (uint256[4][] response);
        function matchMultipleOrders(uint64[] buyTokenIds, uint64[] sellTokenIds) external returns (uint256 matchCount);
    }
}

/// Label attached to settlement transactions in logs and outcomes.
pub const MATCH_LABEL: &str = "matchMultipleOrders";

/// Active order counts `(buy, sell)`.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn active_order_counts<R: LedgerRpc + ?Sized>(
    rpc: &R,
    exchange: Address,
) -> Result<(u64, u64), LedgerError> {
    let counts = view(rpc, exchange, &IExchange::getActiveOrderCountsCall {}).await?;
    let to_u64 = |v: U256| {
        u64::try_from(v).map_err(|e| LedgerError::Decode(format!("order count: {e}")))
    };
    Ok((to_u64(counts.buyTokenOrderCount)?, to_u64(counts.sellTokenOrderCount)?))
}

/// Fetch every active order, paging `chunk_size` rows per call.
///
/// Zero-amount rows are dropped. The snapshot is not atomic: orders changing
/// between pages may be missed or seen twice, which the next cycle corrects.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn fetch_order_book<R: LedgerRpc + ?Sized>(
    rpc: &R,
    exchange: Address,
    chunk_size: u16,
) -> Result<OrderBookSnapshot, LedgerError> {
    let (buy_count, sell_count) = active_order_counts(rpc, exchange).await?;
    let buy_orders = fetch_side(rpc, exchange, Direction::Buy, buy_count, chunk_size).await?;
    let sell_orders = fetch_side(rpc, exchange, Direction::Sell, sell_count, chunk_size).await?;

    debug!(
        buy_count,
        sell_count,
        buy_orders = buy_orders.len(),
        sell_orders = sell_orders.len(),
        "Fetched order book"
    );
    Ok(OrderBookSnapshot::new(buy_orders, sell_orders))
}

async fn fetch_side<R: LedgerRpc + ?Sized>(
    rpc: &R,
    exchange: Address,
    direction: Direction,
    count: u64,
    chunk_size: u16,
) -> Result<Vec<Order>, LedgerError> {
    let chunk = u64::from(chunk_size.max(1));
    let mut orders = Vec::new();
    let mut offset = 0u64;

    while offset < count {
        let rows = match direction {
            Direction::Buy => {
                let call = IExchange::getActiveBuyOrdersCall {
                    offset: U256::from(offset),
                    chunkSize: chunk_size,
                };
                view(rpc, exchange, &call).await?
            }
            Direction::Sell => {
                let call = IExchange::getActiveSellOrdersCall {
                    offset: U256::from(offset),
                    chunkSize: chunk_size,
                };
                view(rpc, exchange, &call).await?
            }
        };
        for row in rows {
            if let Some(order) = parse_order_row(row, direction)? {
                orders.push(order);
            }
        }
        offset += chunk;
    }

    Ok(orders)
}

/// Decode one `[id, maker, price, amount]` row. Empty rows yield `None`.
///
/// # Errors
///
/// Returns a decode error if id or price do not fit their types.
pub fn parse_order_row(row: [U256; 4], direction: Direction) -> Result<Option<Order>, LedgerError> {
    let [id, maker, price, amount] = row;
    if amount.is_zero() {
        return Ok(None);
    }
    let id = u64::try_from(id).map_err(|e| LedgerError::Decode(format!("order id: {e}")))?;
    let price = u32::try_from(price).map_err(|e| LedgerError::Decode(format!("order {id} price: {e}")))?;
    let maker = Address::from_word(B256::from(maker.to_be_bytes::<32>()));
    Ok(Some(Order::new(id, maker, direction, price, amount)))
}

/// Build the settlement transaction for a batch, or `None` for an empty batch.
#[must_use]
pub fn match_multiple_orders_payload(exchange: Address, batch: &MatchBatch) -> Option<TxPayload> {
    if batch.is_empty() {
        return None;
    }
    let call = IExchange::matchMultipleOrdersCall {
        buyTokenIds: batch.buy_ids().iter().map(|id| id.value()).collect(),
        sellTokenIds: batch.sell_ids().iter().map(|id| id.value()).collect(),
    };
    Some(TxPayload::new(
        MATCH_LABEL,
        exchange,
        call.abi_encode(),
        batch.gas_estimate(),
    ))
}

/// Topic filter matching either order event.
#[must_use]
pub fn order_event_topics() -> Vec<String> {
    vec![
        format!("{:#x}", IExchange::NewOrder::SIGNATURE_HASH),
        format!("{:#x}", IExchange::OrderFill::SIGNATURE_HASH),
    ]
}

/// Decoded Exchange event relevant to matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    NewOrder {
        order_id: OrderId,
        maker: Address,
        price: u32,
        token_amount: U256,
        wei_amount: U256,
    },
    OrderFill {
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        price: u32,
        wei_amount: U256,
        token_amount: U256,
    },
}

#[derive(Debug, Deserialize)]
struct RawLog {
    topics: Vec<B256>,
    data: alloy_primitives::Bytes,
}

/// Decode a log notification from an `eth_subscribe("logs")` stream.
///
/// # Errors
///
/// Returns a decode error for malformed logs or unknown event signatures.
pub fn decode_order_event(log: Value) -> Result<OrderEvent, LedgerError> {
    let raw: RawLog =
        serde_json::from_value(log).map_err(|e| LedgerError::Decode(format!("log: {e}")))?;
    let signature = raw
        .topics
        .first()
        .copied()
        .ok_or_else(|| LedgerError::Decode("log without topics".to_string()))?;

    if signature == IExchange::NewOrder::SIGNATURE_HASH {
        let event = IExchange::NewOrder::decode_raw_log(raw.topics, &raw.data)
            .map_err(|e| LedgerError::Decode(format!("NewOrder: {e}")))?;
        Ok(OrderEvent::NewOrder {
            order_id: OrderId::new(event.orderId),
            maker: event.maker,
            price: event.price,
            token_amount: event.tokenAmount,
            wei_amount: event.weiAmount,
        })
    } else if signature == IExchange::OrderFill::SIGNATURE_HASH {
        let event = IExchange::OrderFill::decode_raw_log(raw.topics, &raw.data)
            .map_err(|e| LedgerError::Decode(format!("OrderFill: {e}")))?;
        Ok(OrderEvent::OrderFill {
            buy_order_id: OrderId::new(event.buyTokenOrderId),
            sell_order_id: OrderId::new(event.sellTokenOrderId),
            price: event.price,
            wei_amount: event.weiAmount,
            token_amount: event.tokenAmount,
        })
    } else {
        Err(LedgerError::Decode(format!("unknown event {signature:#x}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;
    use serde_json::json;

    use crate::testkit::ledger::StaticRpc;

    fn row(id: u64, price: u32, amount: u64) -> [U256; 4] {
        let maker = address!("00000000000000000000000000000000000000aa");
        [
            U256::from(id),
            U256::from_be_slice(maker.as_slice()),
            U256::from(price),
            U256::from(amount),
        ]
    }

    #[test]
    fn zero_amount_row_is_dropped() {
        assert!(parse_order_row(row(1, 1_000_000, 0), Direction::Buy)
            .unwrap()
            .is_none());
    }

    #[test]
    fn row_decodes_maker_with_leading_zeros() {
        let order = parse_order_row(row(7, 990_000, 50), Direction::Sell)
            .unwrap()
            .unwrap();
        assert_eq!(order.id, OrderId::new(7));
        assert_eq!(order.maker, address!("00000000000000000000000000000000000000aa"));
        assert_eq!(order.price, 990_000);
        assert_eq!(order.direction, Direction::Sell);
    }

    #[test]
    fn empty_batch_has_no_payload() {
        assert!(match_multiple_orders_payload(Address::ZERO, &MatchBatch::empty()).is_none());
    }

    #[test]
    fn payload_uses_batch_gas_estimate() {
        let mut batch = MatchBatch::empty();
        batch.push(OrderId::new(1), OrderId::new(2), 200_000);
        let payload = match_multiple_orders_payload(Address::ZERO, &batch).unwrap();
        assert_eq!(payload.gas_limit, 200_000);
        assert_eq!(payload.label, MATCH_LABEL);

        let decoded = IExchange::matchMultipleOrdersCall::abi_decode(&payload.data).unwrap();
        assert_eq!(decoded.buyTokenIds, vec![1]);
        assert_eq!(decoded.sellTokenIds, vec![2]);
    }

    #[tokio::test]
    async fn fetch_pages_through_both_sides() {
        let rpc = StaticRpc::new().with_handler("eth_call", |params| {
            let data = params[0]["data"].as_str().unwrap_or_default();
            let bytes = alloy_primitives::hex::decode(data).unwrap_or_default();
            let selector: [u8; 4] = bytes[..4].try_into().unwrap_or_default();
            let encoded = if selector == IExchange::getActiveOrderCountsCall::SELECTOR {
                (U256::from(3u64), U256::from(1u64)).abi_encode_params()
            } else if selector == IExchange::getActiveBuyOrdersCall::SELECTOR {
                let call = IExchange::getActiveBuyOrdersCall::abi_decode(&bytes).unwrap();
                let rows = if call.offset.is_zero() {
                    vec![row(1, 1_000_000, 10), row(2, 1_010_000, 0)]
                } else {
                    vec![row(3, 1_020_000, 30)]
                };
                (rows,).abi_encode_params()
            } else {
                (vec![row(4, 990_000, 40)],).abi_encode_params()
            };
            Ok(json!(alloy_primitives::Bytes::from(encoded)))
        });

        let snapshot = fetch_order_book(&rpc, Address::ZERO, 2).await.unwrap();
        let buy_ids: Vec<u64> = snapshot.buy_orders.iter().map(|o| o.id.value()).collect();
        assert_eq!(buy_ids, vec![3, 1]);
        assert_eq!(snapshot.sell_orders.len(), 1);
        assert_eq!(rpc.calls("eth_call"), 4);
    }

    #[test]
    fn decodes_new_order_log() {
        let event = IExchange::NewOrder {
            orderId: 12,
            maker: address!("00000000000000000000000000000000000000bb"),
            price: 1_000_000,
            tokenAmount: U256::ZERO,
            weiAmount: U256::from(10u64),
        };
        let encoded = event.encode_log_data();
        let value = json!({
            "topics": encoded.topics(),
            "data": encoded.data,
        });

        match decode_order_event(value).unwrap() {
            OrderEvent::NewOrder { order_id, wei_amount, .. } => {
                assert_eq!(order_id, OrderId::new(12));
                assert_eq!(wei_amount, U256::from(10u64));
            }
            other => panic!("expected NewOrder, got {other:?}"),
        }
    }

    #[test]
    fn topics_cover_both_events() {
        let topics = order_event_topics();
        assert_eq!(topics.len(), 2);
        assert!(topics.iter().all(|t| t.starts_with("0x") && t.len() == 66));
    }
}
