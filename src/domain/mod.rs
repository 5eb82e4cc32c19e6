//! Ledger-agnostic domain types.

mod connection;
mod order;
mod throttle;
mod ticker;
mod transaction;

pub use connection::{CloseReason, ConnectionEvent, ConnectionState};
pub use order::{
    sort_buy_orders, sort_sell_orders, Direction, MatchBatch, Order, OrderBookSnapshot, OrderId,
    PPM_DIV,
};
pub use throttle::LogThrottle;
pub use ticker::{median_price, TickerSample, TickerStatus};
pub use transaction::{
    PendingTransaction, ReceiptSummary, TxEvent, TxFailure, TxOutcome, TxPayload, TxStage,
};
