//! Sign, dispatch and track contract transactions.
//!
//! Every submission reads a fresh nonce, gas price and chain id, signs an
//! EIP-155 legacy transaction locally and broadcasts it raw. The pipeline
//! then polls for the receipt and the latest block until the configured
//! number of confirmations is reached, the receipt shows a revert, or the
//! overall timeout elapses. Stage notifications go out on a broadcast
//! channel for logging; the caller receives the terminal outcome.

use std::sync::Arc;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, TxKind, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::adapter::outbound::ledger::eth;
use crate::domain::{
    PendingTransaction, ReceiptSummary, TxEvent, TxFailure, TxOutcome, TxPayload, TxStage,
};
use crate::error::TxError;
use crate::infrastructure::config::TransactionConfig;
use crate::port::LedgerRpc;

const EVENT_CAPACITY: usize = 64;

pub struct TransactionPipeline {
    rpc: Arc<dyn LedgerRpc>,
    signer: PrivateKeySigner,
    config: TransactionConfig,
    events: broadcast::Sender<TxEvent>,
}

impl TransactionPipeline {
    #[must_use]
    pub fn new(rpc: Arc<dyn LedgerRpc>, signer: PrivateKeySigner, config: TransactionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            rpc,
            signer,
            config,
            events,
        }
    }

    /// Sending account.
    #[must_use]
    pub fn account(&self) -> Address {
        self.signer.address()
    }

    /// Subscribe to stage notifications of all later submissions.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    /// Submit `payload` and wait for its terminal outcome.
    pub async fn submit(&self, payload: TxPayload) -> TxOutcome {
        let label = payload.label;
        let mut pending: Option<PendingTransaction> = None;

        let result = tokio::time::timeout(self.config.timeout(), self.drive(payload, &mut pending)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => match &pending {
                Some(tx) => TxOutcome::TimedOut {
                    nonce: tx.nonce,
                    hash: tx.hash,
                },
                None => dispatch_failure(None, "timed out before dispatch".to_string()),
            },
        };

        if let Some(tx) = &pending {
            debug!(nonce = tx.nonce, stage = ?tx.stage, confirmations = tx.confirmations, "Submission finished");
        }
        self.report(label, &outcome);
        self.emit(TxEvent::Finished {
            nonce: outcome.nonce(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn drive(&self, payload: TxPayload, slot: &mut Option<PendingTransaction>) -> TxOutcome {
        let account = self.account();
        let fetched = tokio::try_join!(
            eth::transaction_count(self.rpc.as_ref(), account),
            eth::gas_price(self.rpc.as_ref()),
            eth::chain_id(self.rpc.as_ref()),
        );
        let (nonce, gas_price, chain_id) = match fetched {
            Ok(values) => values,
            Err(e) => return dispatch_failure(None, e.to_string()),
        };

        let raw = match self.sign(&payload, nonce, gas_price, chain_id) {
            Ok(raw) => raw,
            Err(e) => return dispatch_failure(Some(nonce), e.to_string()),
        };

        let tx = slot.insert(PendingTransaction::new(nonce, payload));
        info!(
            label = tx.payload.label,
            nonce,
            to = %tx.payload.to,
            gas_limit = tx.payload.gas_limit,
            gas_price,
            "Dispatching transaction"
        );
        self.emit(TxEvent::Dispatched {
            label: tx.payload.label,
            nonce,
        });

        let hash = match eth::send_raw_transaction(self.rpc.as_ref(), &raw).await {
            Ok(hash) => hash,
            Err(e) => {
                return dispatch_failure(Some(nonce), TxError::Dispatch(e.to_string()).to_string())
            }
        };
        tx.hash = Some(hash);
        tx.stage = TxStage::HashReceived;
        debug!(nonce, hash = %hash, "Transaction hash received");
        self.emit(TxEvent::HashReceived { nonce, hash });

        self.track(tx).await
    }

    async fn track(&self, tx: &mut PendingTransaction) -> TxOutcome {
        let Some(hash) = tx.hash else {
            return dispatch_failure(Some(tx.nonce), "no transaction hash".to_string());
        };
        let nonce = tx.nonce;
        let mut receipt: Option<ReceiptSummary> = None;

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let mined = match &receipt {
                Some(mined) => mined.clone(),
                None => match eth::transaction_receipt(self.rpc.as_ref(), hash).await {
                    Ok(Some(fetched)) => {
                        tx.stage = TxStage::ReceiptReceived;
                        self.emit(TxEvent::ReceiptReceived {
                            nonce,
                            receipt: fetched.clone(),
                        });
                        if !fetched.success {
                            return TxOutcome::Failed(TxFailure::Reverted {
                                nonce,
                                receipt: fetched,
                            });
                        }
                        receipt = Some(fetched.clone());
                        fetched
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(nonce, hash = %hash, error = %e, "Receipt poll failed");
                        continue;
                    }
                },
            };

            let latest = match eth::block_number(self.rpc.as_ref()).await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(nonce, error = %e, "Block number poll failed");
                    continue;
                }
            };

            let confirmations = latest.saturating_sub(mined.block_number);
            if confirmations > tx.confirmations {
                tx.confirmations = confirmations;
                self.emit(TxEvent::Confirmation {
                    nonce,
                    hash,
                    confirmations,
                });
            }
            if tx.confirmations >= self.config.success_confirmations {
                return TxOutcome::Confirmed {
                    nonce,
                    receipt: mined,
                    confirmations: tx.confirmations,
                };
            }
        }
    }

    fn sign(
        &self,
        payload: &TxPayload,
        nonce: u64,
        gas_price: u128,
        chain_id: u64,
    ) -> Result<Vec<u8>, TxError> {
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit: payload.gas_limit,
            to: TxKind::Call(payload.to),
            value: U256::ZERO,
            input: payload.data.clone(),
        };
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| TxError::Signing(e.to_string()))?;
        Ok(TxEnvelope::Legacy(tx.into_signed(signature)).encoded_2718())
    }

    fn emit(&self, event: TxEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn report(&self, label: &'static str, outcome: &TxOutcome) {
        match outcome {
            TxOutcome::Confirmed {
                nonce,
                receipt,
                confirmations,
            } => info!(
                label,
                nonce,
                hash = %receipt.hash,
                block = receipt.block_number,
                gas_used = receipt.gas_used,
                confirmations,
                "Transaction confirmed"
            ),
            TxOutcome::Failed(TxFailure::Reverted { nonce, receipt }) => error!(
                label,
                nonce,
                hash = %receipt.hash,
                block = receipt.block_number,
                gas_used = receipt.gas_used,
                "Transaction reverted"
            ),
            TxOutcome::Failed(TxFailure::Dispatch { nonce, reason }) => error!(
                label,
                nonce = ?nonce,
                reason = %reason,
                "Transaction dispatch failed"
            ),
            TxOutcome::TimedOut { nonce, hash } => warn!(
                label,
                nonce,
                hash = ?hash,
                timeout_secs = self.config.timeout_secs,
                "Transaction not final before timeout, it may still be mined"
            ),
        }
    }
}

fn dispatch_failure(nonce: Option<u64>, reason: String) -> TxOutcome {
    TxOutcome::Failed(TxFailure::Dispatch { nonce, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::{Bytes, B256};
    use serde_json::{json, Value};

    use crate::error::LedgerError;
    use crate::testkit::ledger::StaticRpc;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn signer() -> PrivateKeySigner {
        KEY.parse().unwrap()
    }

    fn hash() -> B256 {
        B256::repeat_byte(0x11)
    }

    fn receipt_json(block: u64, status: u64) -> Value {
        json!({
            "transactionHash": hash(),
            "blockNumber": format!("0x{block:x}"),
            "gasUsed": "0x5208",
            "status": format!("0x{status:x}"),
        })
    }

    fn node() -> StaticRpc {
        StaticRpc::new()
            .with("eth_getTransactionCount", json!("0x7"))
            .with("eth_gasPrice", json!("0x3b9aca00"))
            .with("eth_chainId", json!("0x3e7"))
            .with("eth_sendRawTransaction", json!(hash()))
    }

    fn config(confirmations: u64) -> TransactionConfig {
        TransactionConfig {
            success_confirmations: confirmations,
            timeout_secs: 60,
            poll_interval_ms: 100,
        }
    }

    fn payload() -> TxPayload {
        TxPayload::new("setRate", Address::repeat_byte(0x22), vec![1u8, 2, 3], 80_000)
    }

    fn drain(rx: &mut broadcast::Receiver<TxEvent>) -> Vec<TxEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_after_required_blocks() {
        let rpc = Arc::new(node());
        rpc.push("eth_getTransactionReceipt", Ok(Value::Null));
        rpc.set("eth_getTransactionReceipt", receipt_json(10, 1));
        rpc.push("eth_blockNumber", Ok(json!("0xb")));
        rpc.push("eth_blockNumber", Ok(json!("0xc")));
        rpc.set("eth_blockNumber", json!("0xd"));

        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(3));
        let mut rx = pipeline.events();
        let outcome = pipeline.submit(payload()).await;

        match &outcome {
            TxOutcome::Confirmed {
                nonce,
                receipt,
                confirmations,
            } => {
                assert_eq!(*nonce, 7);
                assert_eq!(receipt.block_number, 10);
                assert_eq!(*confirmations, 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let events = drain(&mut rx);
        assert!(matches!(events[0], TxEvent::Dispatched { nonce: 7, .. }));
        assert!(matches!(events[1], TxEvent::HashReceived { nonce: 7, .. }));
        assert!(matches!(events[2], TxEvent::ReceiptReceived { nonce: 7, .. }));
        let counts: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                TxEvent::Confirmation { confirmations, .. } => Some(*confirmations),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert!(matches!(events.last(), Some(TxEvent::Finished { nonce: Some(7), .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn signs_legacy_transaction_for_node_chain() {
        let rpc = Arc::new(node().with("eth_getTransactionReceipt", receipt_json(10, 1)).with("eth_blockNumber", json!("0x20")));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(1));
        pipeline.submit(payload()).await;

        let params = rpc.requests("eth_sendRawTransaction");
        let raw: Bytes = serde_json::from_value(params[0][0].clone()).unwrap();
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let TxEnvelope::Legacy(signed) = envelope else {
            panic!("expected legacy transaction");
        };
        assert_eq!(signed.tx().nonce, 7);
        assert_eq!(signed.tx().chain_id, Some(999));
        assert_eq!(signed.tx().gas_limit, 80_000);
        assert_eq!(signed.tx().to, TxKind::Call(Address::repeat_byte(0x22)));
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_fails_immediately() {
        let rpc = Arc::new(node().with("eth_getTransactionReceipt", receipt_json(10, 0)));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(12));

        let outcome = pipeline.submit(payload()).await;

        assert!(matches!(
            outcome,
            TxOutcome::Failed(TxFailure::Reverted { nonce: 7, .. })
        ));
        assert_eq!(rpc.calls("eth_blockNumber"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_dispatch_fails_with_nonce() {
        let rpc = Arc::new(node().with_error(
            "eth_sendRawTransaction",
            LedgerError::Rpc {
                code: -32000,
                message: "nonce too low".into(),
            },
        ));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(12));

        let outcome = pipeline.submit(payload()).await;

        match outcome {
            TxOutcome::Failed(TxFailure::Dispatch { nonce, reason }) => {
                assert_eq!(nonce, Some(7));
                assert!(reason.contains("nonce too low"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(rpc.calls("eth_getTransactionReceipt"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_lookup_failure_fails_without_nonce() {
        let rpc = Arc::new(node().with_error("eth_getTransactionCount", LedgerError::NotConnected));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(12));

        let outcome = pipeline.submit(payload()).await;

        assert!(matches!(
            outcome,
            TxOutcome::Failed(TxFailure::Dispatch { nonce: None, .. })
        ));
        assert_eq!(rpc.calls("eth_sendRawTransaction"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_receipt_times_out() {
        let rpc = Arc::new(node().with("eth_getTransactionReceipt", Value::Null));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(12));

        let outcome = pipeline.submit(payload()).await;

        assert_eq!(
            outcome,
            TxOutcome::TimedOut {
                nonce: 7,
                hash: Some(hash())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_is_read_for_every_submission() {
        let rpc = Arc::new(node().with("eth_getTransactionReceipt", receipt_json(1, 1)).with("eth_blockNumber", json!("0x5")));
        let pipeline = TransactionPipeline::new(rpc.clone(), signer(), config(1));

        pipeline.submit(payload()).await;
        pipeline.submit(payload()).await;

        assert_eq!(rpc.calls("eth_getTransactionCount"), 2);
    }
}
