//! Transaction submission types.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use serde::Serialize;

/// Contract call to be signed and dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    /// Short name used in logs, e.g. `matchMultipleOrders`.
    pub label: &'static str,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
}

impl TxPayload {
    #[must_use]
    pub fn new(label: &'static str, to: Address, data: impl Into<Bytes>, gas_limit: u64) -> Self {
        Self {
            label,
            to,
            data: data.into(),
            gas_limit,
        }
    }
}

/// Progress of an in-flight submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStage {
    Dispatched,
    HashReceived,
    ReceiptReceived,
    Confirmed,
    Failed,
}

/// Local record of a submission, dropped once its outcome is reported.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub nonce: u64,
    pub payload: TxPayload,
    pub stage: TxStage,
    pub hash: Option<B256>,
    pub confirmations: u64,
}

impl PendingTransaction {
    #[must_use]
    pub fn new(nonce: u64, payload: TxPayload) -> Self {
        Self {
            nonce,
            payload,
            stage: TxStage::Dispatched,
            hash: None,
            confirmations: 0,
        }
    }
}

/// Summary of a mined receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptSummary {
    pub hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
}

/// Stage notification broadcast while a submission is tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Dispatched {
        label: &'static str,
        nonce: u64,
    },
    HashReceived {
        nonce: u64,
        hash: B256,
    },
    ReceiptReceived {
        nonce: u64,
        receipt: ReceiptSummary,
    },
    Confirmation {
        nonce: u64,
        hash: B256,
        confirmations: u64,
    },
    Finished {
        nonce: Option<u64>,
        outcome: TxOutcome,
    },
}

/// Why a submission failed for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxFailure {
    /// Nonce/gas lookup, signing or dispatch was rejected.
    Dispatch { nonce: Option<u64>, reason: String },
    /// Mined but reverted.
    Reverted { nonce: u64, receipt: ReceiptSummary },
}

/// Terminal result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TxOutcome {
    Confirmed {
        nonce: u64,
        receipt: ReceiptSummary,
        confirmations: u64,
    },
    Failed(TxFailure),
    /// No terminal state within the timeout. The transaction may still land.
    TimedOut { nonce: u64, hash: Option<B256> },
}

impl TxOutcome {
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    #[must_use]
    pub const fn nonce(&self) -> Option<u64> {
        match self {
            Self::Confirmed { nonce, .. }
            | Self::TimedOut { nonce, .. }
            | Self::Failed(TxFailure::Reverted { nonce, .. }) => Some(*nonce),
            Self::Failed(TxFailure::Dispatch { nonce, .. }) => *nonce,
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed { receipt, .. } => write!(f, "confirmed {}", receipt.hash),
            Self::Failed(TxFailure::Dispatch { reason, .. }) => write!(f, "dispatch failed: {reason}"),
            Self::Failed(TxFailure::Reverted { receipt, .. }) => write!(f, "reverted {}", receipt.hash),
            Self::TimedOut { .. } => f.write_str("timed out"),
        }
    }
}
