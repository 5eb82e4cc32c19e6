//! Shared call plumbing for the contract bindings.

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolCall;

use crate::adapter::outbound::ledger::eth;
use crate::error::LedgerError;
use crate::port::LedgerRpc;

/// Encode a currency symbol as a right-padded ASCII `bytes32`.
///
/// Symbols longer than 32 bytes are truncated; configuration rejects them
/// before they get here.
#[must_use]
pub fn symbol_bytes(symbol: &str) -> B256 {
    let mut word = [0u8; 32];
    let bytes = symbol.as_bytes();
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

/// Issue a view call and decode its return data.
pub(super) async fn view<R, C>(rpc: &R, to: Address, call: &C) -> Result<C::Return, LedgerError>
where
    R: LedgerRpc + ?Sized,
    C: SolCall,
{
    let output = eth::call(rpc, to, &call.abi_encode()).await?;
    C::abi_decode_returns(&output).map_err(|e| LedgerError::Decode(format!("{}: {e}", C::SIGNATURE)))
}
