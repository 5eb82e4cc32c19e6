//! Rates oracle contract.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::call::{symbol_bytes, view};
use crate::domain::TxPayload;
use crate::error::{LedgerError, TxError};
use crate::port::LedgerRpc;

sol! {
    interface IRates {
        function rates(bytes32 symbol) external view returns (uint256 rate, uint256 lastUpdated);
        function convertFromWei(bytes32 bSymbol, uint256 weiValue) external view returns (uint256 value);
        function setRate(bytes32 symbol, uint256 newRate) external;
    }

    interface IAugmintToken {
        function decimals() external view returns (uint8);
    }
}

pub const SET_RATE_LABEL: &str = "setRate";

const ONE_ETH_IN_WEI: u64 = 1_000_000_000_000_000_000;

/// Rate stored on-chain for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRate {
    /// Fiat price of 1 ETH.
    pub rate: Decimal,
    /// Raw contract value, `rate * 10^decimals`.
    pub raw: U256,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Token base units per 1 ETH at the stored rate.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn conversion_rate<R: LedgerRpc + ?Sized>(
    rpc: &R,
    rates: Address,
    symbol: &str,
) -> Result<U256, LedgerError> {
    let call = IRates::convertFromWeiCall {
        bSymbol: symbol_bytes(symbol),
        weiValue: U256::from(ONE_ETH_IN_WEI),
    };
    view(rpc, rates, &call).await
}

/// Decimals of the token the oracle prices; rates are stored scaled by
/// `10^decimals`.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn token_decimals<R: LedgerRpc + ?Sized>(
    rpc: &R,
    token: Address,
) -> Result<u32, LedgerError> {
    let decimals = view(rpc, token, &IAugmintToken::decimalsCall {}).await?;
    Ok(u32::from(decimals))
}

/// Read the stored rate, scaled down by the token's decimals.
///
/// # Errors
///
/// Returns any node error, or a decode error if the value does not fit a
/// decimal.
pub async fn fetch_rate<R: LedgerRpc + ?Sized>(
    rpc: &R,
    rates: Address,
    symbol: &str,
    decimals: u32,
) -> Result<StoredRate, LedgerError> {
    let info = view(
        rpc,
        rates,
        &IRates::ratesCall {
            symbol: symbol_bytes(symbol),
        },
    )
    .await?;

    let rate = scale_down(info.rate, decimals)?;
    let last_updated = i64::try_from(info.lastUpdated)
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(StoredRate {
        rate,
        raw: info.rate,
        last_updated,
    })
}

fn scale_down(raw: U256, decimals: u32) -> Result<Decimal, LedgerError> {
    let mantissa = i128::try_from(raw)
        .map_err(|e| LedgerError::Decode(format!("stored rate {raw}: {e}")))?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map_err(|e| LedgerError::Decode(format!("stored rate {raw}: {e}")))
}

/// Contract value for `price`: rounded half away from zero to `decimals`
/// places, then scaled up.
///
/// # Errors
///
/// Returns [`TxError::Encoding`] for negative or oversized prices.
pub fn rate_value(price: Decimal, decimals: u32) -> Result<U256, TxError> {
    let factor = 10u64
        .checked_pow(decimals)
        .ok_or_else(|| TxError::Encoding(format!("unsupported decimals {decimals}")))?;
    price
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::from(factor))
        .and_then(|scaled| scaled.trunc().to_u128())
        .map(U256::from)
        .ok_or_else(|| TxError::Encoding(format!("rate {price} out of range")))
}

/// Build a `setRate` transaction for `price`.
///
/// # Errors
///
/// Returns [`TxError::Encoding`] if the price cannot be represented.
pub fn set_rate_payload(
    rates: Address,
    symbol: &str,
    price: Decimal,
    decimals: u32,
    gas_limit: u64,
) -> Result<TxPayload, TxError> {
    let call = IRates::setRateCall {
        symbol: symbol_bytes(symbol),
        newRate: rate_value(price, decimals)?,
    };
    Ok(TxPayload::new(SET_RATE_LABEL, rates, call.abi_encode(), gas_limit))
}
