//! Exchange, Rates and token contracts served over `eth_call`.
//!
//! [`MarketFixture`] holds an order book and oracle state and answers the
//! view calls the keeper makes. Install it on a [`StaticRpc`] and mutate it
//! between cycles.

use std::sync::Arc;

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use parking_lot::RwLock;
use serde_json::{json, Value};

use super::ledger::StaticRpc;
use crate::adapter::outbound::contracts::exchange::IExchange;
use crate::adapter::outbound::contracts::rates::{IAugmintToken, IRates};
use crate::domain::Order;
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct MarketState {
    conversion_rate: U256,
    stored_rate: U256,
    last_updated: u64,
    token_decimals: u8,
    buy_orders: Vec<Order>,
    sell_orders: Vec<Order>,
}

/// In-memory contract state answering Exchange and Rates view calls.
#[derive(Debug, Default)]
pub struct MarketFixture {
    state: RwLock<MarketState>,
}

impl MarketFixture {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(MarketState {
                token_decimals: 2,
                ..MarketState::default()
            }),
        })
    }

    /// Value returned by the token's `decimals()`.
    pub fn set_token_decimals(&self, decimals: u8) {
        self.state.write().token_decimals = decimals;
    }

    /// Token base units per 1 ETH returned by `convertFromWei`.
    pub fn set_conversion_rate(&self, rate: u64) {
        self.state.write().conversion_rate = U256::from(rate);
    }

    /// Raw value and update time returned by `rates(symbol)`.
    pub fn set_stored_rate(&self, raw: u64, last_updated: u64) {
        let mut state = self.state.write();
        state.stored_rate = U256::from(raw);
        state.last_updated = last_updated;
    }

    pub fn set_orders(&self, buy_orders: Vec<Order>, sell_orders: Vec<Order>) {
        let mut state = self.state.write();
        state.buy_orders = buy_orders;
        state.sell_orders = sell_orders;
    }

    /// Serve `eth_call` on `rpc` from this fixture.
    pub fn install(self: &Arc<Self>, rpc: &StaticRpc) {
        let fixture = Arc::clone(self);
        rpc.set_handler("eth_call", move |params| fixture.answer(params));
    }

    /// Answer one `eth_call`.
    ///
    /// # Errors
    ///
    /// Fails with `-32000` for calls the fixture does not know.
    pub fn answer(&self, params: &Value) -> Result<Value, LedgerError> {
        let data = params[0]["data"].as_str().unwrap_or_default();
        let input = hex::decode(data).map_err(|e| LedgerError::Decode(e.to_string()))?;
        if input.len() < 4 {
            return Err(revert("empty calldata"));
        }
        let selector: [u8; 4] = [input[0], input[1], input[2], input[3]];
        let state = self.state.read();

        let encoded = match selector {
            IRates::convertFromWeiCall::SELECTOR => state.conversion_rate.abi_encode(),
            IRates::ratesCall::SELECTOR => {
                (state.stored_rate, U256::from(state.last_updated)).abi_encode_params()
            }
            IAugmintToken::decimalsCall::SELECTOR => U256::from(state.token_decimals).abi_encode(),
            IExchange::getActiveOrderCountsCall::SELECTOR => (
                U256::from(state.buy_orders.len()),
                U256::from(state.sell_orders.len()),
            )
                .abi_encode_params(),
            IExchange::getActiveBuyOrdersCall::SELECTOR => {
                let call = IExchange::getActiveBuyOrdersCall::abi_decode(&input)
                    .map_err(|e| LedgerError::Decode(e.to_string()))?;
                (page(&state.buy_orders, call.offset, call.chunkSize),).abi_encode_params()
            }
            IExchange::getActiveSellOrdersCall::SELECTOR => {
                let call = IExchange::getActiveSellOrdersCall::abi_decode(&input)
                    .map_err(|e| LedgerError::Decode(e.to_string()))?;
                (page(&state.sell_orders, call.offset, call.chunkSize),).abi_encode_params()
            }
            _ => return Err(revert("unknown selector")),
        };
        Ok(json!(Bytes::from(encoded)))
    }
}

fn page(orders: &[Order], offset: U256, chunk_size: u16) -> Vec<[U256; 4]> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    orders
        .iter()
        .skip(offset)
        .take(usize::from(chunk_size))
        .map(|o| {
            [
                U256::from(o.id.value()),
                U256::from_be_slice(o.maker.as_slice()),
                U256::from(o.price),
                o.amount,
            ]
        })
        .collect()
}

fn revert(message: &str) -> LedgerError {
    LedgerError::Rpc {
        code: -32000,
        message: message.to_string(),
    }
}

/// Decoded `matchMultipleOrders` calls sent through `rpc`, in order.
#[must_use]
pub fn sent_match_calls(rpc: &StaticRpc) -> Vec<IExchange::matchMultipleOrdersCall> {
    sent_inputs(rpc)
        .iter()
        .filter_map(|input| IExchange::matchMultipleOrdersCall::abi_decode(input).ok())
        .collect()
}

/// Decoded `setRate` calls sent through `rpc`, in order.
#[must_use]
pub fn sent_set_rate_calls(rpc: &StaticRpc) -> Vec<IRates::setRateCall> {
    sent_inputs(rpc)
        .iter()
        .filter_map(|input| IRates::setRateCall::abi_decode(input).ok())
        .collect()
}

fn sent_inputs(rpc: &StaticRpc) -> Vec<Bytes> {
    rpc.requests("eth_sendRawTransaction")
        .into_iter()
        .filter_map(|params| serde_json::from_value::<Bytes>(params[0].clone()).ok())
        .filter_map(|raw| TxEnvelope::decode_2718(&mut raw.as_ref()).ok())
        .filter_map(|envelope| match envelope {
            TxEnvelope::Legacy(signed) => Some(signed.tx().input.clone()),
            _ => None,
        })
        .collect()
}
